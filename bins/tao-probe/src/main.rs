//! tao-probe - Ogg Theora 信息探测工具
//!
//! 对标 FFmpeg 的 ffprobe, 输出容器与 Theora 头部信息.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use tao::logging::{self, LoggingConfig};
use tao_codec::decoders::theora::{TheoraHeaders, read_headers};
use tao_format::{Demuxer, IoContext, OggTheoraSource, Stream};

/// Ogg Theora 信息探测工具
#[derive(Parser, Debug)]
#[command(name = "tao-probe", version, about = "纯 Rust Ogg Theora 信息探测工具")]
struct Cli {
    /// 输入文件路径
    input: String,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 显示注释头中的全部注释
    #[arg(long)]
    show_comments: bool,

    /// 日志详细程度 (-v=debug, -vv=trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 日志文件目录 (按天滚动)
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

// ============================================================
// 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize, Debug)]
struct ProbeOutput {
    format: FormatInfo,
    streams: Vec<StreamInfo>,
    theora: TheoraInfo,
}

/// 格式信息
#[derive(Serialize, Debug)]
struct FormatInfo {
    filename: String,
    format_name: String,
    nb_streams: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    probe_score: u32,
}

/// 流信息
#[derive(Serialize, Debug)]
struct StreamInfo {
    index: usize,
    codec_type: String,
    codec_name: String,
    time_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    nb_frames: u64,
}

/// Theora 头部信息
#[derive(Serialize, Debug)]
struct TheoraInfo {
    version: String,
    frame_width: u32,
    frame_height: u32,
    picture_width: u32,
    picture_height: u32,
    picture_x: u32,
    picture_y: u32,
    frame_rate: String,
    fps: f64,
    sample_aspect_ratio: String,
    pixel_format: String,
    colorspace: String,
    bitrate: u32,
    quality: u8,
    kfgshift: u8,
    vendor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<Vec<CommentEntry>>,
}

#[derive(Serialize, Debug)]
struct CommentEntry {
    key: String,
    value: String,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::new("tao-probe", cli.verbose);
    if let Some(dir) = &cli.log_file {
        log_config = log_config.with_directory(dir);
    }
    if let Err(e) = logging::init(&log_config) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("tao-probe 版本 {}", tao::version());
    let io = IoContext::open_read(&cli.input)
        .with_context(|| format!("无法打开文件 '{}'", cli.input))?;
    let output = probe(io, &cli.input, cli.show_comments)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

/// 探测格式并读取第一条 Theora 流的三个头包
fn probe(mut io: IoContext, filename: &str, show_comments: bool) -> Result<ProbeOutput> {
    let registry = tao::default_format_registry();
    let probe_result = registry
        .probe_input(&mut io, Some(filename))
        .context("无法识别文件格式")?;
    debug!(
        "格式: {} (置信度: {})",
        probe_result.format_id, probe_result.score
    );

    let mut source = OggTheoraSource::new(io).context("无法解析 Ogg 头部")?;
    let format = FormatInfo {
        filename: filename.to_string(),
        format_name: probe_result.format_id.name().to_string(),
        nb_streams: source.demuxer().streams().len(),
        duration: source.demuxer().duration(),
        probe_score: probe_result.score,
    };
    let streams = source.demuxer().streams().iter().map(build_stream_info).collect();

    let headers = read_headers(&mut source).context("Theora 头包解析失败")?;
    Ok(ProbeOutput {
        format,
        streams,
        theora: build_theora_info(&headers, show_comments),
    })
}

fn build_stream_info(stream: &Stream) -> StreamInfo {
    let duration = if stream.duration > 0 && stream.time_base.is_valid() {
        Some(stream.duration as f64 * stream.time_base.to_f64())
    } else {
        None
    };
    StreamInfo {
        index: stream.index,
        codec_type: stream.media_type.to_string(),
        codec_name: stream.codec_id.to_string(),
        time_base: format!("{}/{}", stream.time_base.num, stream.time_base.den),
        duration,
        nb_frames: stream.nb_frames,
    }
}

fn build_theora_info(headers: &TheoraHeaders, show_comments: bool) -> TheoraInfo {
    let id = &headers.identification;
    let (major, minor, revision) = id.version();
    let sar = id.sample_aspect_ratio();
    TheoraInfo {
        version: format!("{major}.{minor}.{revision}"),
        frame_width: id.frame_width(),
        frame_height: id.frame_height(),
        picture_width: id.pic_width,
        picture_height: id.pic_height,
        picture_x: id.pic_x,
        picture_y: id.pic_y,
        frame_rate: format!("{}/{}", id.frame_rate_num, id.frame_rate_den),
        fps: id.fps(),
        sample_aspect_ratio: format!("{}:{}", sar.num, sar.den),
        pixel_format: id.pixel_format.to_pixel_format().to_string(),
        colorspace: id.color_space().to_string(),
        bitrate: id.bitrate,
        quality: id.quality,
        kfgshift: id.kfgshift,
        vendor: headers.comment.vendor.clone(),
        comments: show_comments.then(|| {
            headers
                .comment
                .comments
                .iter()
                .map(|(key, value)| CommentEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect()
        }),
    }
}

fn print_text(output: &ProbeOutput) {
    let f = &output.format;
    println!("[FORMAT]");
    println!("  文件名       : {}", f.filename);
    println!("  格式名称     : {}", f.format_name);
    println!("  流数量       : {}", f.nb_streams);
    if let Some(dur) = f.duration {
        println!("  时长         : {dur:.3} 秒");
    }
    println!("  探测置信度   : {}", f.probe_score);
    println!("[/FORMAT]");
    println!();

    for s in &output.streams {
        println!("[STREAM #{}]", s.index);
        println!("  类型         : {}", s.codec_type);
        println!("  编解码器     : {}", s.codec_name);
        println!("  时间基       : {}", s.time_base);
        if let Some(dur) = s.duration {
            println!("  时长         : {dur:.3} 秒");
        }
        if s.nb_frames > 0 {
            println!("  帧数         : {}", s.nb_frames);
        }
        println!("[/STREAM]");
        println!();
    }

    let t = &output.theora;
    println!("[THEORA]");
    println!("  版本         : {}", t.version);
    println!("  编码帧       : {}x{}", t.frame_width, t.frame_height);
    println!(
        "  图像区域     : {}x{} @ ({}, {})",
        t.picture_width, t.picture_height, t.picture_x, t.picture_y
    );
    println!("  帧率         : {} ({:.6} fps)", t.frame_rate, t.fps);
    println!("  SAR          : {}", t.sample_aspect_ratio);
    println!("  像素格式     : {}", t.pixel_format);
    println!("  色彩空间     : {}", t.colorspace);
    if t.bitrate > 0 {
        println!("  码率         : {} kbps", t.bitrate / 1000);
    }
    println!("  质量         : {}", t.quality);
    println!("  kfgshift     : {}", t.kfgshift);
    println!("  编码器       : {}", t.vendor);
    if let Some(comments) = &t.comments {
        for c in comments {
            println!("  注释         : {}={}", c.key, c.value);
        }
    }
    println!("[/THEORA]");
}

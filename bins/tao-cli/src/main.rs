//! tao-cli - Ogg Theora 解码命令行工具
//!
//! 把 Ogg Theora 文件解码为 YUV4MPEG2 或原始 YUV 平面.

mod output;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};

use tao::logging::{self, LoggingConfig};
use tao_codec::{CodecParameters, Decoder, Packet};
use tao_core::{MediaType, TaoError};
use tao_format::IoContext;

use output::{FrameWriter, OutputFormat, StreamDescription};

#[derive(Parser, Debug)]
#[command(name = "tao-cli", version, about = "纯 Rust Ogg Theora 解码工具")]
struct Cli {
    /// 输入文件路径
    #[arg(short, long)]
    input: String,

    /// 输出文件路径, 省略时只解码不输出
    #[arg(short, long)]
    output: Option<String>,

    /// 输出格式, 省略时按输出文件扩展名推断
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// 最多解码的帧数
    #[arg(long)]
    frames: Option<u64>,

    /// 日志详细程度 (-v=debug, -vv=trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 日志文件目录 (按天滚动)
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

/// 解码统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DecodeSummary {
    frames: u64,
    keyframes: u64,
}

fn main() {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::new("tao-cli", cli.verbose);
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
    info!("tao-cli 版本 {}", tao::version());

    let io = IoContext::open_read(&cli.input)
        .with_context(|| format!("无法打开输入文件 '{}'", cli.input))?;

    let summary = match &cli.output {
        Some(path) => {
            let format = cli.format.unwrap_or_else(|| OutputFormat::from_path(path));
            let file =
                File::create(path).with_context(|| format!("无法创建输出文件 '{path}'"))?;
            let summary = decode(io, &cli.input, BufWriter::new(file), format, cli.frames)?;
            info!("输出: {path} ({format:?})");
            summary
        }
        None => decode(io, &cli.input, std::io::sink(), OutputFormat::Yuv, cli.frames)?,
    };

    info!(
        "解码完成: {} 帧, 其中关键帧 {} 帧",
        summary.frames, summary.keyframes
    );
    Ok(())
}

/// 探测输入, 解码第一条视频流并写出
fn decode<W: Write>(
    mut io: IoContext,
    filename: &str,
    out: W,
    format: OutputFormat,
    max_frames: Option<u64>,
) -> Result<DecodeSummary> {
    let format_registry = tao::default_format_registry();
    let codec_registry = tao::default_codec_registry();

    let mut demuxer = format_registry
        .open_input(&mut io, Some(filename))
        .context("无法打开输入格式")?;
    info!("输入格式: {}, {} 条流", demuxer.name(), demuxer.streams().len());

    let stream = demuxer
        .streams()
        .iter()
        .find(|s| s.media_type == MediaType::Video)
        .cloned()
        .context("输入中没有视频流")?;
    let params = stream.video_params().context("视频流缺少参数")?;
    info!(
        "视频流 #{}: {} {}x{} {} @ {}",
        stream.index,
        stream.codec_id,
        params.width,
        params.height,
        params.pixel_format,
        params.frame_rate
    );

    let mut decoder = codec_registry.create_decoder(stream.codec_id)?;
    decoder.open(&CodecParameters::from_extra_data(
        stream.codec_id,
        stream.extra_data.clone(),
    ))?;

    let desc = StreamDescription {
        width: params.width,
        height: params.height,
        pixel_format: params.pixel_format,
        frame_rate: params.frame_rate,
        sample_aspect_ratio: params.sample_aspect_ratio,
    };
    let mut writer = FrameWriter::new(out, format, desc);
    let mut summary = DecodeSummary::default();
    let limit = max_frames.unwrap_or(u64::MAX);

    let mut flushing = false;
    while summary.frames < limit {
        if !flushing {
            match demuxer.read_packet(&mut io) {
                Ok(packet) if packet.stream_index == stream.index => {
                    decoder.send_packet(&packet)?;
                }
                Ok(_) => continue,
                Err(TaoError::Eof) => {
                    debug!("输入结束, 刷新解码器");
                    decoder.send_packet(&Packet::empty())?;
                    flushing = true;
                }
                Err(e) => return Err(e).context("读取数据包失败"),
            }
        }

        if drain(decoder.as_mut(), &mut writer, &mut summary, limit)? {
            break;
        }
    }

    if summary.frames == 0 {
        warn!("没有解码出任何帧");
    }
    writer.finish()?;
    Ok(summary)
}

/// 取出解码器中所有可用帧, 返回是否已到达末尾
fn drain<W: Write>(
    decoder: &mut dyn Decoder,
    writer: &mut FrameWriter<W>,
    summary: &mut DecodeSummary,
    limit: u64,
) -> Result<bool> {
    while summary.frames < limit {
        match decoder.receive_frame() {
            Ok(frame) => {
                let frame = frame.into_video();
                if frame.is_keyframe {
                    summary.keyframes += 1;
                }
                writer.write_frame(&frame)?;
                summary.frames += 1;
            }
            Err(TaoError::NeedMoreData) => return Ok(false),
            Err(TaoError::Eof) => return Ok(true),
            Err(e) => bail!("解码失败: {e}"),
        }
    }
    Ok(true)
}

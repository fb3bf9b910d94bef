//! Ogg Theora 解封装 + 解码集成测试.
//!
//! 测试:
//! 1. 注册表探测 + demux + Decoder trait 解码管线
//! 2. OggTheoraSource + TheoraStream 拉取式解码
//! 3. 容器错误 (丢页, 数据包未收尾) 传递到解码层
//! 4. 参考样本文件端到端解码 (样本不存在时跳过)

mod common;

#[path = "../crates/tao-codec/src/decoders/theora/test_util.rs"]
mod test_util;

use common::{FLAG_BOS, FLAG_CONTINUED, FLAG_EOS, OggWriter, granule, sample_path};
use tao::codec::decoders::theora::{
    FrameType, PacketSource, TheoraContext, TheoraError, TheoraStream, read_headers,
    to_video_frame,
};
use tao::codec::{CodecId, CodecParameters, Packet, PictureType};
use tao::core::{MediaType, PixelFormat, Rational, TaoError};
use tao::format::{FormatId, IoContext, OggTheoraSource};
use test_util::{IdentParams, build_empty_inter_frame, build_header_packets, build_intra_frame};

const SERIAL: u32 = 0x0BAD_CAFE;
const KFGSHIFT: u32 = 6;

/// 32x32 4:2:0 流: 帧内帧, 无变化帧间帧, 重复帧 (空包)
fn build_stream(params: &IdentParams) -> Vec<u8> {
    let [id, comment, setup] = build_header_packets(params, 0);
    let mut dcs = vec![0i32; 24];
    dcs[0] = 12;
    let intra = build_intra_frame(10, &dcs);
    let inter = build_empty_inter_frame(10, 3);

    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[&id], false)
        .page(0, 0, &[&comment, &setup], false)
        .page(0, granule(0, 1, KFGSHIFT), &[&intra, &inter], false)
        .page(FLAG_EOS, granule(0, 2, KFGSHIFT), &[&[]], false);
    writer.finish()
}

fn default_stream() -> Vec<u8> {
    build_stream(&IdentParams::new(2, 2, 0))
}

// ============================================================
// Demuxer + Decoder 管线
// ============================================================

#[test]
fn test_theora_registry_pipeline() {
    let format_registry = tao::default_format_registry();
    let codec_registry = tao::default_codec_registry();

    let mut io = IoContext::from_memory(default_stream());
    let probe = format_registry.probe_input(&mut io, Some("clip.ogv")).unwrap();
    assert_eq!(probe.format_id, FormatId::Ogg);

    let mut demuxer = format_registry.create_demuxer(probe.format_id).unwrap();
    demuxer.open(&mut io).unwrap();
    assert_eq!(demuxer.streams().len(), 1);
    let stream = demuxer.streams()[0].clone();
    assert_eq!(stream.media_type, MediaType::Video);
    assert_eq!(stream.codec_id, CodecId::Theora);
    assert_eq!(stream.time_base, Rational::new(1, 30));
    let video = stream.video_params().unwrap();
    assert_eq!((video.width, video.height), (32, 32));
    assert_eq!(video.pixel_format, PixelFormat::Yuv420p);

    let mut decoder = codec_registry.create_decoder(CodecId::Theora).unwrap();
    decoder
        .open(&CodecParameters::from_extra_data(
            CodecId::Theora,
            stream.extra_data.clone(),
        ))
        .unwrap();

    let mut frames = Vec::new();
    loop {
        match demuxer.read_packet(&mut io) {
            Ok(packet) => decoder.send_packet(&packet).unwrap(),
            Err(TaoError::Eof) => {
                decoder.send_packet(&Packet::empty()).unwrap();
            }
            Err(e) => panic!("读取数据包失败: {e}"),
        }
        loop {
            match decoder.receive_frame() {
                Ok(frame) => frames.push(frame.into_video()),
                Err(TaoError::NeedMoreData) => break,
                Err(TaoError::Eof) => {
                    assert_eq!(frames.len(), 3);
                    let pts: Vec<i64> = frames.iter().map(|f| f.pts).collect();
                    assert_eq!(pts, vec![0, 1, 2]);
                    assert_eq!(frames[0].picture_type, PictureType::I);
                    assert_eq!(frames[1].picture_type, PictureType::P);
                    assert!(frames.iter().all(|f| f.data[0].iter().all(|&v| v == 140)));
                    assert!(frames.iter().all(|f| f.data[1].iter().all(|&v| v == 128)));
                    return;
                }
                Err(e) => panic!("解码失败: {e}"),
            }
        }
    }
}

#[test]
fn test_theora_demux_metadata_and_duration() {
    let mut io = IoContext::from_memory(default_stream());
    let mut demuxer = tao::default_format_registry()
        .open_input(&mut io, None)
        .unwrap();
    // 时长来自最大 granule: 3 帧 @ 30 fps
    let duration = demuxer.duration().unwrap();
    assert!((duration - 0.1).abs() < 1e-9);

    // comment 头在读到数据包后才附加到流上
    let mut header_packets = 0;
    while let Ok(packet) = demuxer.read_packet(&mut io) {
        if packet.pts == tao::core::timestamp::NOPTS_VALUE {
            header_packets += 1;
        }
    }
    assert_eq!(header_packets, 2);
    let metadata = demuxer.metadata();
    assert_eq!(
        metadata[0],
        ("vendor".to_string(), "tao test encoder".to_string())
    );
    assert!(
        metadata
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("encoder") && v == "tao")
    );
}

// ============================================================
// OggTheoraSource + TheoraStream
// ============================================================

#[test]
fn test_theora_stream_from_memory() {
    let source = OggTheoraSource::from_memory(default_stream()).unwrap();
    let mut stream = TheoraStream::new(source).unwrap();
    let id = &stream.headers().identification;
    assert_eq!((id.pic_width, id.pic_height), (32, 32));
    assert_eq!(id.version(), (3, 2, 1));
    assert!((id.fps() - 30.0).abs() < 1e-9);
    assert_eq!(stream.headers().comment.get("encoder"), Some("tao"));

    let first = stream.next_frame().unwrap().unwrap();
    let second = stream.next_frame().unwrap().unwrap();
    let third = stream.next_frame().unwrap().unwrap();
    assert_eq!(first.frame_type, FrameType::Intra);
    assert_eq!(second.frame_type, FrameType::Inter);
    assert_eq!(third.planes, second.planes);
    assert!(stream.next_frame().unwrap().is_none());
}

#[test]
fn test_theora_stream_444_cropped() {
    let mut params = IdentParams::new(2, 2, 3);
    params.pic_width = 20;
    params.pic_height = 18;
    params.pic_x = 4;
    params.pic_y = 6;
    let [id, comment, setup] = build_header_packets(&params, 0);
    // 4:4:4: 每个平面 16 块
    let intra = build_intra_frame(0, &[0; 48]);
    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[&id], false)
        .page(0, 0, &[&comment, &setup], false)
        .page(FLAG_EOS, granule(0, 0, KFGSHIFT), &[&intra], false);

    let mut source = OggTheoraSource::from_memory(writer.finish()).unwrap();
    assert_eq!(
        source.stream().video_params().unwrap().pixel_format,
        PixelFormat::Yuv444p
    );
    let headers = read_headers(&mut source).unwrap();
    let mut ctx = TheoraContext::new(headers);
    let packet = source.next_packet().unwrap().unwrap();
    let frame = ctx.decode_packet(&packet).unwrap();
    let out = to_video_frame(&frame, &ctx.headers().identification);
    assert_eq!((out.width, out.height), (20, 18));
    assert_eq!(out.linesize, vec![20, 20, 20]);
    assert!(out.data.iter().all(|p| p.len() == 20 * 18));
    assert!(out.data.iter().flatten().all(|&v| v == 128));
}

// ============================================================
// 容器错误
// ============================================================

#[test]
fn test_theora_stream_lost_page() {
    let params = IdentParams::new(2, 2, 0);
    let [id, comment, setup] = build_header_packets(&params, 0);
    let intra = build_intra_frame(10, &[0; 24]);
    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[&id], false)
        .page(0, 0, &[&comment, &setup], false)
        .skip_sequence()
        .page(FLAG_EOS, granule(0, 0, KFGSHIFT), &[&intra], false);

    let source = OggTheoraSource::from_memory(writer.finish()).unwrap();
    let mut stream = TheoraStream::new(source).unwrap();
    assert!(matches!(stream.next_frame(), Err(TheoraError::LostPage(_))));
}

#[test]
fn test_theora_stream_missing_end_of_packet() {
    let params = IdentParams::new(2, 2, 0);
    let [id, comment, setup] = build_header_packets(&params, 0);
    let mut padded = build_intra_frame(10, &[0; 24]);
    padded.resize(255, 0);
    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[&id], false)
        .page(0, 0, &[&comment, &setup], false)
        .page(0, -1, &[&padded], true);

    let source = OggTheoraSource::from_memory(writer.finish()).unwrap();
    let mut stream = TheoraStream::new(source).unwrap();
    assert!(matches!(
        stream.next_frame(),
        Err(TheoraError::MissingEndOfPacket(_))
    ));
}

#[test]
fn test_theora_packet_across_pages() {
    let params = IdentParams::new(2, 2, 0);
    let [id, _, setup] = build_header_packets(&params, 0);
    let vendor = "v".repeat(300);
    let comment = test_util::build_comment_header(&vendor, &["ENCODER=tao"]);
    let (head, tail) = comment.split_at(255);
    let mut dcs = vec![0i32; 24];
    dcs[0] = -8;
    let intra = build_intra_frame(10, &dcs);

    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[&id], false)
        .page(0, -1, &[head], true)
        .page(FLAG_CONTINUED, 0, &[tail, &setup], false)
        .page(FLAG_EOS, granule(0, 0, KFGSHIFT), &[&intra], false);

    let source = OggTheoraSource::from_memory(writer.finish()).unwrap();
    let mut stream = TheoraStream::new(source).unwrap();
    assert_eq!(stream.headers().comment.vendor, vendor);
    let frame = stream.next_frame().unwrap().unwrap();
    assert!(frame.planes[0].data.iter().all(|&v| v == 120));
}

#[test]
fn test_theora_identification_must_fit_bos_page() {
    let params = IdentParams::new(2, 2, 0);
    let [id, comment, setup] = build_header_packets(&params, 0);
    let mut padded = id.clone();
    padded.resize(300, 0);
    let (first, rest) = padded.split_at(255);
    let mut writer = OggWriter::new(SERIAL);
    writer
        .page(FLAG_BOS, 0, &[first], true)
        .page(FLAG_CONTINUED, 0, &[rest], false)
        .page(0, 0, &[&comment, &setup], false);

    assert!(OggTheoraSource::from_memory(writer.finish()).is_err());
}

// ============================================================
// 参考样本
// ============================================================

fn decode_sample(name: &str) -> Option<(TheoraStream<OggTheoraSource>, usize)> {
    let path = sample_path(name)?;
    let source = OggTheoraSource::open(&path).unwrap();
    let mut stream = TheoraStream::new(source).unwrap();
    let mut count = 0usize;
    while stream.next_frame().unwrap().is_some() {
        count += 1;
    }
    Some((stream, count))
}

#[test]
fn test_sample_320x240() {
    let Some((stream, count)) = decode_sample("sample_320x240.ogv") else {
        return;
    };
    let headers = stream.headers();
    let id = &headers.identification;
    assert_eq!(count, 120);
    assert_eq!((id.pic_width, id.pic_height), (320, 240));
    assert!((id.fps() - 30.000299).abs() < 1e-6);
    assert_eq!(id.pixel_format.bits(), 0);
    assert!(headers.comment.comments.is_empty());
}

#[test]
fn test_sample_720x400() {
    let Some((stream, count)) = decode_sample("sample_720x400.ogv") else {
        return;
    };
    let headers = stream.headers();
    assert_eq!(count, 813);
    assert_eq!(headers.identification.bitrate, 0);
    assert_eq!(headers.comment.vendor, "Xiph.Org libTheora I 20060526 3 2 0");
    assert_eq!(headers.comment.get("encoder"), Some("ffmpeg2theora 0.19"));
}

//! Ogg 容器解封装器.
//!
//! 只暴露 Theora 逻辑流, 其余逻辑流的页面被忽略.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 段表中连续的 255 段加上一个小于 255 的段组成一个完整数据包.
//! 页面以 255 段结尾时, 数据包在下一页 (continued 标志) 继续.
//!
//! 解封装是严格的: 页面序号跳变, 孤立的续页, 未收尾的数据包都直接报错,
//! 不做重新同步.

use std::collections::{HashMap, VecDeque};

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use log::{debug, trace, warn};
use tao_codec::decoders::theora::{
    IdentificationHeader, parse_comment_header, parse_identification_header,
};
use tao_codec::{CodecId, Packet};
use tao_core::timestamp::NOPTS_VALUE;
use tao_core::{MediaType, Rational, TaoError, TaoResult};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::FormatProbe;
use crate::stream::{Stream, StreamParams, VideoStreamParams};

/// Ogg 同步字 (capture pattern)
const OGG_SYNC: &[u8; 4] = b"OggS";
/// Ogg CRC-32 多项式
const OGG_CRC_POLY: u32 = 0x04C11DB7;
/// 页头固定部分长度 (不含段表)
const PAGE_HEADER_LEN: usize = 27;

/// 页面头部标志
pub(crate) const FLAG_CONTINUED: u8 = 0x01;
pub(crate) const FLAG_BOS: u8 = 0x02;
pub(crate) const FLAG_EOS: u8 = 0x04;

/// 已解析的 Ogg 页面
struct OggPage {
    header_type: u8,
    granule_position: i64,
    serial_number: u32,
    page_sequence: u32,
    segment_table: Vec<u8>,
    data: Vec<u8>,
}

impl OggPage {
    fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    /// 是否为续延页面 (前一个 packet 的延续)
    fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    /// 从段表中提取 packet 边界
    ///
    /// 返回 (offset, length, is_complete) 列表
    fn extract_packets(&self) -> Vec<(usize, usize, bool)> {
        let mut packets = Vec::new();
        let mut offset = 0usize;
        let mut current_len = 0usize;
        let mut pending = false;

        for &seg_size in &self.segment_table {
            current_len += seg_size as usize;
            pending = true;
            if seg_size < 255 {
                packets.push((offset, current_len, true));
                offset += current_len;
                current_len = 0;
                pending = false;
            }
        }

        // 最后一个段是 255, packet 跨页面
        if pending {
            packets.push((offset, current_len, false));
        }

        packets
    }
}

/// 计算 Ogg 页面 CRC-32 (CRC 字段按 0 参与计算)
pub(crate) fn ogg_crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ OGG_CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// 读取一个 Ogg 页面并校验 CRC
///
/// 在页面边界处读到文件末尾时返回 `Eof`.
fn read_page(io: &mut IoContext) -> TaoResult<OggPage> {
    let mut header = [0u8; PAGE_HEADER_LEN];
    io.read_exact(&mut header)?;
    if &header[0..4] != OGG_SYNC {
        return Err(TaoError::InvalidData("无效的 Ogg 同步字".into()));
    }
    let version = header[4];
    if version != 0 {
        return Err(TaoError::InvalidData(format!(
            "不支持的 Ogg 版本: {version}"
        )));
    }

    let header_type = header[5];
    let granule_position = LittleEndian::read_i64(&header[6..14]);
    let serial_number = LittleEndian::read_u32(&header[14..18]);
    let page_sequence = LittleEndian::read_u32(&header[18..22]);
    let crc = LittleEndian::read_u32(&header[22..26]);
    let num_segments = header[26] as usize;

    let segment_table = io.read_bytes(num_segments)?;
    let data_size: usize = segment_table.iter().map(|&s| s as usize).sum();
    let data = io.read_bytes(data_size)?;

    header[22..26].fill(0);
    let mut crc_page = Vec::with_capacity(PAGE_HEADER_LEN + num_segments + data_size);
    crc_page.extend_from_slice(&header);
    crc_page.extend_from_slice(&segment_table);
    crc_page.extend_from_slice(&data);
    let crc_calc = ogg_crc32(&crc_page);
    if crc != crc_calc {
        return Err(TaoError::InvalidData(format!(
            "Ogg 页面 CRC 校验失败: 读取=0x{crc:08X}, 计算=0x{crc_calc:08X}",
        )));
    }

    trace!(
        "Ogg 页面: serial=0x{serial_number:08X}, seq={page_sequence}, flags=0x{header_type:02X}, granule={granule_position}, {num_segments} 段, {data_size} 字节",
    );

    Ok(OggPage {
        header_type,
        granule_position,
        serial_number,
        page_sequence,
        segment_table,
        data,
    })
}

/// BOS 数据包是否为 Theora identification 头
fn is_theora_bos(packet: &[u8]) -> bool {
    packet.len() >= 7 && packet[0] == 0x80 && &packet[1..7] == b"theora"
}

/// Theora granule 拆分参数
#[derive(Debug, Clone, Copy)]
struct TheoraGranule {
    shift: u32,
    /// 3.2.1 及之后的码流 granule 从 1 开始计数
    one_based: bool,
}

impl TheoraGranule {
    fn new(id: &IdentificationHeader) -> Self {
        Self {
            shift: u32::from(id.kfgshift),
            one_based: id.version() >= (3, 2, 1),
        }
    }

    /// granule 对应的帧序号 (从 0 开始), 负数 granule 返回 None
    fn frame_index(self, granule: i64) -> Option<i64> {
        if granule < 0 {
            return None;
        }
        let keyframe = granule >> self.shift;
        let delta = granule & ((1i64 << self.shift) - 1);
        let count = keyframe + delta;
        Some(if self.one_based { count - 1 } else { count })
    }
}

/// Ogg 逻辑流状态
struct OggLogicalStream {
    serial_number: u32,
    stream_index: usize,
    granule: TheoraGranule,
    /// 跨页累积的不完整 packet
    partial_packet: Vec<u8>,
    last_page_sequence: u32,
    /// 已输出的头包数量
    header_packets: usize,
    ended: bool,
}

/// Ogg 解封装器
pub struct OggDemuxer {
    streams: Vec<Stream>,
    logical_streams: Vec<OggLogicalStream>,
    /// 被忽略的非 Theora 逻辑流
    ignored_serials: Vec<u32>,
    packet_queue: VecDeque<Packet>,
    eof: bool,
    duration_sec: Option<f64>,
}

impl Default for OggDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl OggDemuxer {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            logical_streams: Vec::new(),
            ignored_serials: Vec::new(),
            packet_queue: VecDeque::new(),
            eof: false,
            duration_sec: None,
        }
    }

    /// 创建 Ogg 解封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 处理 BOS 页面: Theora 流建立 Stream, 其他流记入忽略列表
    fn handle_bos_page(&mut self, page: &OggPage) -> TaoResult<()> {
        let packets = page.extract_packets();
        let first = packets
            .first()
            .filter(|&&(_, _, complete)| complete)
            .map(|&(offset, length, _)| &page.data[offset..offset + length]);

        let Some(packet_data) = first.filter(|p| is_theora_bos(p)) else {
            warn!(
                "Ogg: 忽略非 Theora 逻辑流 serial=0x{:08X}",
                page.serial_number
            );
            self.ignored_serials.push(page.serial_number);
            return Ok(());
        };

        let id = parse_identification_header(packet_data)?;
        let stream_index = self.streams.len();
        let frame_rate = id.frame_rate();
        let params = StreamParams::Video(VideoStreamParams {
            width: id.pic_width,
            height: id.pic_height,
            pixel_format: id.pixel_format.to_pixel_format(),
            frame_rate,
            sample_aspect_ratio: id.sample_aspect_ratio(),
            bit_rate: u64::from(id.bitrate),
        });
        let time_base = if frame_rate.is_valid() {
            frame_rate.invert()
        } else {
            Rational::new(1, 1000)
        };

        self.streams.push(Stream {
            index: stream_index,
            media_type: MediaType::Video,
            codec_id: CodecId::Theora,
            time_base,
            duration: -1,
            start_time: 0,
            nb_frames: 0,
            extra_data: packet_data.to_vec(),
            params,
            metadata: Vec::new(),
        });
        self.logical_streams.push(OggLogicalStream {
            serial_number: page.serial_number,
            stream_index,
            granule: TheoraGranule::new(&id),
            partial_packet: Vec::new(),
            last_page_sequence: page.page_sequence,
            header_packets: 1,
            ended: false,
        });

        debug!(
            "Ogg: 发现 Theora 流 #{stream_index} (serial=0x{:08X}), {}x{}, {} fps",
            page.serial_number,
            id.pic_width,
            id.pic_height,
            id.fps(),
        );
        Ok(())
    }

    fn find_logical_stream(&self, serial: u32) -> Option<usize> {
        self.logical_streams
            .iter()
            .position(|s| s.serial_number == serial)
    }

    /// 处理非 BOS 页面, 提取数据包
    fn process_page(&mut self, page: OggPage) -> TaoResult<()> {
        let Some(ls_idx) = self.find_logical_stream(page.serial_number) else {
            if !self.ignored_serials.contains(&page.serial_number) {
                warn!(
                    "Ogg: 页面属于未声明的逻辑流 serial=0x{:08X}, 已忽略",
                    page.serial_number
                );
            }
            return Ok(());
        };

        let ls = &mut self.logical_streams[ls_idx];
        if ls.ended {
            warn!("Ogg: 流 #{} 在 EOS 之后仍有页面, 已忽略", ls.stream_index);
            return Ok(());
        }

        let expected = ls.last_page_sequence.wrapping_add(1);
        if page.page_sequence != expected {
            return Err(TaoError::LostPage(format!(
                "流 #{} 页面序号 {} 之后出现 {}",
                ls.stream_index, ls.last_page_sequence, page.page_sequence
            )));
        }
        ls.last_page_sequence = page.page_sequence;

        if page.is_continued() && ls.partial_packet.is_empty() {
            return Err(TaoError::LostPage(format!(
                "流 #{} 页面 {} 标记为续页, 但没有未完成的数据包",
                ls.stream_index, page.page_sequence
            )));
        }
        if !page.is_continued() && !ls.partial_packet.is_empty() {
            return Err(TaoError::MissingEndOfPacket(format!(
                "流 #{} 页面 {} 开始新数据包, 上一数据包仍缺 {} 字节之后的部分",
                ls.stream_index,
                page.page_sequence,
                ls.partial_packet.len()
            )));
        }

        let mut completed = Vec::new();
        for (i, &(offset, length, complete)) in page.extract_packets().iter().enumerate() {
            let chunk = &page.data[offset..offset + length];
            if i == 0 && page.is_continued() {
                ls.partial_packet.extend_from_slice(chunk);
                if complete {
                    completed.push(std::mem::take(&mut ls.partial_packet));
                }
            } else if complete {
                completed.push(chunk.to_vec());
            } else {
                ls.partial_packet.extend_from_slice(chunk);
            }
        }

        if page.is_eos() {
            ls.ended = true;
            if !ls.partial_packet.is_empty() {
                return Err(TaoError::MissingEndOfPacket(format!(
                    "流 #{} 在 EOS 页结束时数据包未收尾 ({} 字节)",
                    ls.stream_index,
                    ls.partial_packet.len()
                )));
            }
            debug!("Ogg: 流 #{} (serial=0x{:08X}) 结束", ls.stream_index, page.serial_number);
        }

        // 页面 granule 属于最后一个完整数据包, 之前的数据包逐个向前推算
        let last_frame = ls.granule.frame_index(page.granule_position);
        let data_count = completed.iter().filter(|p| !is_header(p)).count() as i64;
        let mut data_seen = 0i64;
        let stream_index = ls.stream_index;
        for data in completed {
            let pts = if is_header(&data) {
                NOPTS_VALUE
            } else {
                data_seen += 1;
                last_frame.map_or(NOPTS_VALUE, |last| last - (data_count - data_seen))
            };
            self.emit_packet(ls_idx, stream_index, pts, data);
        }
        Ok(())
    }

    /// 创建并入队一个数据包
    fn emit_packet(&mut self, ls_idx: usize, stream_index: usize, pts: i64, data: Vec<u8>) {
        if is_header(&data) {
            let ls = &mut self.logical_streams[ls_idx];
            ls.header_packets += 1;
            if ls.header_packets == 2 {
                self.attach_comments(stream_index, &data);
            }
        }

        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.stream_index = stream_index;
        pkt.pts = pts;
        pkt.dts = pts;
        pkt.duration = 1;
        // 帧数据包第 2 位为 0 表示帧内帧, 空包是重复帧
        pkt.is_keyframe = pkt.data.first().is_some_and(|b| b & 0xC0 == 0);
        pkt.pos = 0;
        if let Some(stream) = self.streams.get(stream_index) {
            pkt.time_base = stream.time_base;
        }
        self.packet_queue.push_back(pkt);
    }

    /// 把 comment 头包中的键值写入流元数据
    fn attach_comments(&mut self, stream_index: usize, data: &[u8]) {
        match parse_comment_header(data) {
            Ok(comment) => {
                if let Some(stream) = self.streams.get_mut(stream_index) {
                    stream.metadata = comment.comments;
                    stream
                        .metadata
                        .insert(0, ("vendor".to_string(), comment.vendor));
                }
            }
            Err(e) => warn!("Ogg: 流 #{stream_index} comment 头包解析失败: {e}"),
        }
    }

    /// 检查 EOF 时是否存在未收尾的数据包
    fn check_unfinished(&self) -> TaoResult<()> {
        if let Some(ls) = self
            .logical_streams
            .iter()
            .find(|ls| !ls.partial_packet.is_empty())
        {
            return Err(TaoError::MissingEndOfPacket(format!(
                "流 #{} 在文件结束时数据包未收尾 ({} 字节)",
                ls.stream_index,
                ls.partial_packet.len()
            )));
        }
        Ok(())
    }

    /// 估算时长并回填流 duration (帧数)
    ///
    /// 仅在可 seek 输入上启用, 扫描剩余页面取每条流的最大 granule.
    fn estimate_duration(&mut self, io: &mut IoContext) -> TaoResult<()> {
        self.duration_sec = None;
        if !io.is_seekable() {
            return Ok(());
        }

        let resume_pos = io.position()?;
        let mut max_granule_by_serial: HashMap<u32, i64> = HashMap::new();
        // 扫描失败只影响时长估算, 真正的错误留给 read_packet 报告
        while let Ok(page) = read_page(io) {
            if page.granule_position < 0 || self.find_logical_stream(page.serial_number).is_none()
            {
                continue;
            }
            let entry = max_granule_by_serial
                .entry(page.serial_number)
                .or_insert(page.granule_position);
            *entry = (*entry).max(page.granule_position);
        }
        io.seek(std::io::SeekFrom::Start(resume_pos))?;

        for ls in &self.logical_streams {
            if let Some(&granule) = max_granule_by_serial.get(&ls.serial_number)
                && let Some(last) = ls.granule.frame_index(granule)
                && let Some(stream) = self.streams.get_mut(ls.stream_index)
            {
                stream.duration = last + 1;
                stream.nb_frames = (last + 1).max(0) as u64;
            }
        }

        self.duration_sec = self
            .streams
            .iter()
            .filter(|s| s.duration > 0 && s.time_base.is_valid())
            .map(|s| s.duration as f64 * s.time_base.to_f64())
            .reduce(f64::max);
        Ok(())
    }
}

/// Theora 头包首位为 1
fn is_header(packet: &[u8]) -> bool {
    packet.first().is_some_and(|b| b & 0x80 != 0)
}

impl Demuxer for OggDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }

    fn name(&self) -> &str {
        "ogg"
    }

    fn open(&mut self, io: &mut IoContext) -> TaoResult<()> {
        // 读取所有 BOS 页面, 第一个非 BOS 页面标志头部结束
        loop {
            let page = read_page(io)?;
            if page.is_bos() {
                self.handle_bos_page(&page)?;
            } else {
                self.process_page(page)?;
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(TaoError::InvalidData("Ogg 文件中未找到 Theora 流".into()));
        }

        if let Err(e) = self.estimate_duration(io) {
            debug!("Ogg 时长估算失败: {e}");
        }
        debug!("打开 Ogg: {} 个 Theora 流", self.streams.len());
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet> {
        loop {
            if let Some(pkt) = self.packet_queue.pop_front() {
                return Ok(pkt);
            }
            if self.eof {
                return Err(TaoError::Eof);
            }

            match read_page(io) {
                Ok(page) => {
                    if page.is_bos() && self.find_logical_stream(page.serial_number).is_none() {
                        // 串接的新链路或迟到的 BOS
                        self.handle_bos_page(&page)?;
                    } else {
                        self.process_page(page)?;
                    }
                }
                Err(TaoError::Eof) => {
                    self.eof = true;
                    self.check_unfinished()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        _io: &mut IoContext,
        _stream_index: usize,
        _timestamp: i64,
        _flags: SeekFlags,
    ) -> TaoResult<()> {
        Err(TaoError::Unsupported("Ogg Theora 不支持 seek".into()))
    }

    fn duration(&self) -> Option<f64> {
        self.duration_sec
    }

    fn metadata(&self) -> &[(String, String)] {
        self.streams
            .first()
            .map(|s| s.metadata.as_slice())
            .unwrap_or(&[])
    }
}

/// Ogg 格式探测器
pub struct OggProbe;

impl FormatProbe for OggProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<crate::probe::ProbeScore> {
        if data.len() >= 4 && &data[0..4] == OGG_SYNC {
            return Some(crate::probe::SCORE_MAX);
        }

        let ext = filename?.rsplit('.').next()?.to_ascii_lowercase();
        matches!(ext.as_str(), "ogg" | "ogv" | "ogx").then_some(crate::probe::SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }
}

#[cfg(test)]
pub(crate) mod test_pages {
    //! 测试用 Ogg 页面构造

    use super::ogg_crc32;

    /// 构建一个 Ogg 页面 (含正确的 CRC), `packets` 中每个包按 lacing 写入段表,
    /// `last_open` 为真时最后一个包不写结束段 (在下一页继续)
    pub(crate) fn build_page(
        header_type: u8,
        granule: i64,
        serial: u32,
        page_seq: u32,
        packets: &[&[u8]],
        last_open: bool,
    ) -> Vec<u8> {
        let mut segments = Vec::new();
        for (i, packet) in packets.iter().enumerate() {
            let mut remaining = packet.len();
            while remaining >= 255 {
                segments.push(255u8);
                remaining -= 255;
            }
            if !(last_open && i + 1 == packets.len()) {
                segments.push(remaining as u8);
            }
        }

        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(header_type);
        page.extend_from_slice(&(granule as u64).to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&page_seq.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(segments.len() as u8);
        page.extend_from_slice(&segments);
        for packet in packets {
            page.extend_from_slice(packet);
        }

        let crc = ogg_crc32(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }
}

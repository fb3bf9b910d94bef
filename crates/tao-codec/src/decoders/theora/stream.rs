//! 按流解码: 持有头信息, 映射表与参考帧, 逐包产出帧.

use std::sync::Arc;

use bytes::Bytes;
use log::debug;

use super::error::{TheoraError, TheoraResult};
use super::frame::{FrameDecoder, TheoraFrame};
use super::headers::{
    TheoraHeaders, parse_comment_header, parse_identification_header, parse_setup_header,
};
use super::mapping::MappingTables;

/// Theora 数据包来源
///
/// 每次返回一个完整的数据包, 没有更多数据时返回 `Ok(None)`.
pub trait PacketSource {
    fn next_packet(&mut self) -> TheoraResult<Option<Bytes>>;
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn next_packet(&mut self) -> TheoraResult<Option<Bytes>> {
        (**self).next_packet()
    }
}

/// 内存中的数据包序列
impl PacketSource for std::collections::VecDeque<Bytes> {
    fn next_packet(&mut self) -> TheoraResult<Option<Bytes>> {
        Ok(self.pop_front())
    }
}

/// 解码上下文: 头信息, 映射表, 上一帧与黄金帧
pub struct TheoraContext {
    headers: TheoraHeaders,
    mapping: MappingTables,
    previous: Option<Arc<TheoraFrame>>,
    golden: Option<Arc<TheoraFrame>>,
    frame_count: u64,
}

impl TheoraContext {
    pub fn new(headers: TheoraHeaders) -> Self {
        let mapping = MappingTables::new(&headers.identification);
        Self {
            headers,
            mapping,
            previous: None,
            golden: None,
            frame_count: 0,
        }
    }

    pub fn headers(&self) -> &TheoraHeaders {
        &self.headers
    }

    /// 已解码的帧数 (含重复帧)
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 丢弃参考帧, 下一帧必须是帧内帧
    pub fn reset_references(&mut self) {
        self.previous = None;
        self.golden = None;
    }

    /// 解码一个帧数据包
    ///
    /// 空数据包表示重复上一帧, 不读取任何比特.
    pub fn decode_packet(&mut self, packet: &[u8]) -> TheoraResult<Arc<TheoraFrame>> {
        if packet.is_empty() {
            let previous = self.previous.clone().ok_or_else(|| {
                TheoraError::InvalidFramePacket("首个数据帧为空包, 没有可重复的帧".into())
            })?;
            self.frame_count += 1;
            debug!("Theora 帧 #{}: 空包, 重复上一帧", self.frame_count);
            return Ok(previous);
        }

        let frame = FrameDecoder::decode(
            &self.headers,
            &self.mapping,
            self.previous.as_deref(),
            self.golden.as_deref(),
            packet,
        )?;
        let frame = Arc::new(frame);
        if frame.is_keyframe() {
            self.golden = Some(Arc::clone(&frame));
        }
        self.previous = Some(Arc::clone(&frame));
        self.frame_count += 1;

        debug!(
            "Theora 帧 #{}: {:?}, {} 字节, {} 个块已编码",
            self.frame_count,
            frame.frame_type,
            packet.len(),
            frame.coded_block_count(),
        );
        Ok(frame)
    }
}

/// 从数据包来源读取三个头包
pub fn read_headers<S: PacketSource + ?Sized>(source: &mut S) -> TheoraResult<TheoraHeaders> {
    let mut next = |what: &str| -> TheoraResult<Bytes> {
        source
            .next_packet()?
            .ok_or_else(|| TheoraError::InvalidHeader(format!("缺少 {what} 头包")))
    };
    let identification = parse_identification_header(&next("identification")?)?;
    let comment = parse_comment_header(&next("comment")?)?;
    let setup = parse_setup_header(&next("setup")?)?;
    Ok(TheoraHeaders::new(identification, comment, setup))
}

/// 拉取式解码流
pub struct TheoraStream<S> {
    source: S,
    context: TheoraContext,
}

impl<S: PacketSource> TheoraStream<S> {
    /// 读取三个头包并建立解码上下文
    pub fn new(mut source: S) -> TheoraResult<Self> {
        let headers = read_headers(&mut source)?;
        Ok(Self {
            source,
            context: TheoraContext::new(headers),
        })
    }

    pub fn headers(&self) -> &TheoraHeaders {
        self.context.headers()
    }

    pub fn context(&self) -> &TheoraContext {
        &self.context
    }

    /// 解码下一帧, 数据耗尽时返回 `Ok(None)`
    pub fn next_frame(&mut self) -> TheoraResult<Option<Arc<TheoraFrame>>> {
        match self.source.next_packet()? {
            Some(packet) => self.context.decode_packet(&packet).map(Some),
            None => Ok(None),
        }
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: PacketSource> Iterator for TheoraStream<S> {
    type Item = TheoraResult<Arc<TheoraFrame>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

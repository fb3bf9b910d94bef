//! Ogg Theora 数据包来源.
//!
//! 把 [`OggDemuxer`] 适配为 Theora 解码器的 [`PacketSource`]:
//! 先产出 identification 头包 (解封装器把它保存在 `extra_data` 中),
//! 之后逐个产出所选 Theora 流的数据包.

use std::io::SeekFrom;

use bytes::Bytes;
use log::debug;
use tao_codec::decoders::theora::{PacketSource, TheoraResult};
use tao_core::{TaoError, TaoResult};

use crate::demuxer::Demuxer;
use crate::demuxers::ogg::OggDemuxer;
use crate::io::IoContext;
use crate::stream::Stream;

/// 单条 Ogg Theora 逻辑流的数据包来源
pub struct OggTheoraSource {
    io: IoContext,
    demuxer: OggDemuxer,
    stream_index: usize,
    pending_identification: Option<Bytes>,
}

impl OggTheoraSource {
    /// 打开 Ogg 输入并选中第一条 Theora 流
    pub fn new(mut io: IoContext) -> TaoResult<Self> {
        let mut demuxer = OggDemuxer::new();
        demuxer.open(&mut io)?;
        let stream = demuxer
            .streams()
            .first()
            .ok_or_else(|| TaoError::InvalidData("Ogg 文件中未找到 Theora 流".into()))?;
        let stream_index = stream.index;
        let pending_identification = Some(Bytes::from(stream.extra_data.clone()));
        if demuxer.streams().len() > 1 {
            debug!(
                "Ogg 中有 {} 条 Theora 流, 使用流 #{stream_index}",
                demuxer.streams().len()
            );
        }
        Ok(Self {
            io,
            demuxer,
            stream_index,
            pending_identification,
        })
    }

    /// 从文件路径打开
    pub fn open(path: &str) -> TaoResult<Self> {
        Self::new(IoContext::open_read(path)?)
    }

    /// 从内存数据打开
    pub fn from_memory(data: Vec<u8>) -> TaoResult<Self> {
        Self::new(IoContext::from_memory(data))
    }

    /// 所选 Theora 流的信息
    pub fn stream(&self) -> &Stream {
        &self.demuxer.streams()[self.stream_index]
    }

    pub fn demuxer(&self) -> &OggDemuxer {
        &self.demuxer
    }

    /// 底层 I/O, 供容器层的随机读取使用
    pub fn io(&mut self) -> &mut IoContext {
        &mut self.io
    }

    pub fn read_u8(&mut self) -> TaoResult<u8> {
        self.io.read_u8()
    }

    pub fn read_u16(&mut self) -> TaoResult<u16> {
        self.io.read_u16_le()
    }

    pub fn read_u24(&mut self) -> TaoResult<u32> {
        self.io.read_u24_le()
    }

    pub fn read_u32(&mut self) -> TaoResult<u32> {
        self.io.read_u32_le()
    }

    /// 定位到绝对偏移
    pub fn seek(&mut self, offset: u64) -> TaoResult<u64> {
        self.io.seek(SeekFrom::Start(offset))
    }

    /// 相对跳过
    pub fn skip(&mut self, count: usize) -> TaoResult<()> {
        self.io.skip(count)
    }

    pub fn read_u8_at(&mut self, offset: u64) -> TaoResult<u8> {
        self.io.read_u8_at(offset)
    }

    /// 输入总长度 (字节)
    pub fn total_length(&self) -> Option<u64> {
        self.io.size()
    }
}

impl PacketSource for OggTheoraSource {
    fn next_packet(&mut self) -> TheoraResult<Option<Bytes>> {
        if let Some(id) = self.pending_identification.take() {
            return Ok(Some(id));
        }
        loop {
            match self.demuxer.read_packet(&mut self.io) {
                Ok(pkt) if pkt.stream_index == self.stream_index => return Ok(Some(pkt.data)),
                Ok(_) => continue,
                Err(TaoError::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

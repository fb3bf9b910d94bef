//! Theora 视频解码器.
//!
//! 支持 Theora 3.2 码流的全部三种像素格式 (4:2:0, 4:2:2, 4:4:4).
//! 内部按 Theora 约定自底向上存储像素, 输出时翻转为自顶向下并裁剪到图像区域.
//!
//! 两种用法:
//! - [`TheoraStream`] 直接从 [`PacketSource`] 拉取数据包逐帧解码
//! - [`TheoraDecoder`] 实现统一的 [`Decoder`] trait, 由解码器注册表创建

mod bitreader;
mod dc;
pub mod error;
pub mod frame;
pub mod headers;
mod huffman;
pub mod idct;
mod loop_filter;
mod mapping;
mod quant;
mod recon;
pub mod stream;
mod tables;

#[cfg(test)]
pub(crate) mod test_util;

use std::collections::VecDeque;

use log::debug;
use tao_core::color::ColorRange;
use tao_core::{TaoError, TaoResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::frame::{Frame, PictureType, VideoFrame};
use crate::packet::Packet;

pub use self::error::{TheoraError, TheoraResult};
pub use self::frame::{CodingMode, FrameType, MotionVector, Plane, TheoraFrame};
pub use self::headers::{
    CommentHeader, IdentificationHeader, SetupHeader, TheoraHeaders, TheoraPixelFormat,
    is_header_packet, parse_comment_header, parse_identification_header, parse_setup_header,
};
pub use self::stream::{PacketSource, TheoraContext, TheoraStream, read_headers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Identification,
    Comment,
    Setup,
    Data,
}

/// 拆分 Xiph lacing 打包的头包: 首字节为包数减一, 随后是除最后一包外的长度
pub fn split_xiph_lacing(data: &[u8]) -> TheoraResult<Vec<&[u8]>> {
    let Some((&count_minus_one, mut rest)) = data.split_first() else {
        return Err(TheoraError::InvalidHeader("Xiph lacing 数据为空".into()));
    };
    let mut sizes = Vec::with_capacity(usize::from(count_minus_one));
    for _ in 0..count_minus_one {
        let mut size = 0usize;
        loop {
            let Some((&b, tail)) = rest.split_first() else {
                return Err(TheoraError::InvalidHeader("Xiph lacing 长度字段截断".into()));
            };
            rest = tail;
            size += usize::from(b);
            if b != 255 {
                break;
            }
        }
        sizes.push(size);
    }

    let mut packets = Vec::with_capacity(sizes.len() + 1);
    for size in sizes {
        if size > rest.len() {
            return Err(TheoraError::InvalidHeader(format!(
                "Xiph lacing 包长度越界: {size} > {}",
                rest.len()
            )));
        }
        let (packet, tail) = rest.split_at(size);
        packets.push(packet);
        rest = tail;
    }
    packets.push(rest);
    Ok(packets)
}

/// 把解码帧转换为输出视频帧: 翻转为自顶向下并裁剪到图像区域
pub fn to_video_frame(frame: &TheoraFrame, id: &IdentificationHeader) -> VideoFrame {
    let pf = id.pixel_format;
    let mut out = VideoFrame::new(id.pic_width, id.pic_height, pf.to_pixel_format());

    for (pli, plane) in frame.planes.iter().enumerate() {
        let (halve_x, halve_y) = if pli == 0 {
            (false, false)
        } else {
            (pf.chroma_halved_x(), pf.chroma_halved_y())
        };
        // 奇数偏移时色度区域要覆盖图像两侧各自压到的半个采样
        let crop = |offset: u32, size: u32, halve: bool| -> (usize, usize) {
            if halve {
                let first = offset / 2;
                (first as usize, ((offset + size).div_ceil(2) - first) as usize)
            } else {
                (offset as usize, size as usize)
            }
        };
        let (x0, width) = crop(id.pic_x, id.pic_width, halve_x);
        let (y0, height) = crop(id.pic_y, id.pic_height, halve_y);

        let mut data = Vec::with_capacity(width * height);
        for row in (y0..y0 + height).rev() {
            data.extend_from_slice(&plane.row(row)[x0..x0 + width]);
        }
        out.data[pli] = data;
        out.linesize[pli] = width;
    }

    out.is_keyframe = frame.is_keyframe();
    out.picture_type = if frame.is_keyframe() {
        PictureType::I
    } else {
        PictureType::P
    };
    out.sample_aspect_ratio = id.sample_aspect_ratio();
    out.color_space = id.color_space();
    out.color_range = ColorRange::Limited;
    out
}

/// Theora 解码器
pub struct TheoraDecoder {
    opened: bool,
    flushing: bool,
    stage: HeaderStage,
    identification: Option<IdentificationHeader>,
    /// identification 头包原文, 用于跳过容器重复送入的同一头包
    raw_identification: Vec<u8>,
    comment: Option<CommentHeader>,
    context: Option<TheoraContext>,
    pending: VecDeque<VideoFrame>,
}

impl TheoraDecoder {
    /// 创建 Theora 解码器 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()))
    }

    pub fn new() -> Self {
        Self {
            opened: false,
            flushing: false,
            stage: HeaderStage::Identification,
            identification: None,
            raw_identification: Vec::new(),
            comment: None,
            context: None,
            pending: VecDeque::new(),
        }
    }

    /// 三个头包全部解析后可用
    pub fn headers(&self) -> Option<&TheoraHeaders> {
        self.context.as_ref().map(TheoraContext::headers)
    }

    fn handle_header(&mut self, data: &[u8]) -> TheoraResult<()> {
        if self.stage != HeaderStage::Identification
            && !self.raw_identification.is_empty()
            && data == self.raw_identification.as_slice()
        {
            debug!("Theora: 跳过重复的 identification 头包");
            return Ok(());
        }

        match self.stage {
            HeaderStage::Identification => {
                self.identification = Some(parse_identification_header(data)?);
                self.raw_identification = data.to_vec();
                self.stage = HeaderStage::Comment;
            }
            HeaderStage::Comment => {
                self.comment = Some(parse_comment_header(data)?);
                self.stage = HeaderStage::Setup;
            }
            HeaderStage::Setup => {
                let setup = parse_setup_header(data)?;
                let (Some(identification), Some(comment)) =
                    (self.identification.take(), self.comment.take())
                else {
                    return Err(TheoraError::InvalidHeader("setup 前缺少其他头包".into()));
                };
                self.context = Some(TheoraContext::new(TheoraHeaders::new(
                    identification,
                    comment,
                    setup,
                )));
                self.stage = HeaderStage::Data;
            }
            HeaderStage::Data => {
                return Err(TheoraError::InvalidFramePacket(
                    "头包出现在数据包之后".into(),
                ));
            }
        }
        Ok(())
    }

    fn handle_data(&mut self, packet: &Packet) -> TheoraResult<()> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| TheoraError::InvalidHeader("头包尚未解析完成".into()))?;
        let frame = context.decode_packet(&packet.data)?;

        let mut video = to_video_frame(&frame, &context.headers().identification);
        video.pts = packet.pts;
        video.time_base = if packet.time_base.is_valid() {
            packet.time_base
        } else {
            context.headers().identification.frame_rate().invert()
        };
        video.duration = 1;
        self.pending.push_back(video);
        Ok(())
    }
}

impl Default for TheoraDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TheoraDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Theora
    }

    fn name(&self) -> &str {
        "theora"
    }

    fn open(&mut self, params: &CodecParameters) -> TaoResult<()> {
        *self = Self::new();
        self.opened = true;

        if params.extra_data.is_empty() {
            return Ok(());
        }
        if is_header_packet(&params.extra_data) {
            self.handle_header(&params.extra_data)?;
        } else {
            for packet in split_xiph_lacing(&params.extra_data)? {
                self.handle_header(packet)?;
            }
        }
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> TaoResult<()> {
        if !self.opened {
            return Err(TaoError::Codec("Theora 解码器未打开".into()));
        }

        // 无容器位置的空包是刷新请求, 容器中读出的空包是重复帧
        if packet.is_empty() && packet.pos < 0 {
            self.flushing = true;
            return Ok(());
        }

        let data = packet.data.as_ref();
        if self.stage != HeaderStage::Data || is_header_packet(data) {
            self.handle_header(data)?;
            return Ok(());
        }
        self.handle_data(packet)?;
        Ok(())
    }

    fn receive_frame(&mut self) -> TaoResult<Frame> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Frame::Video(frame));
        }
        if self.flushing {
            return Err(TaoError::Eof);
        }
        Err(TaoError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.flushing = false;
        self.pending.clear();
        if let Some(context) = self.context.as_mut() {
            context.reset_references();
        }
    }
}

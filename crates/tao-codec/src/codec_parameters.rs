//! 编解码器参数.
//!
//! 对标 FFmpeg 的 `AVCodecParameters`, 描述编解码器的配置参数.

use tao_core::{PixelFormat, Rational};

use crate::codec_id::CodecId;

/// 编解码器参数
///
/// 传递给解码器的配置信息, 通常从容器格式中提取.
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 额外数据 (Theora: 单个 identification 头包, 或 Xiph lacing 打包的三个头包)
    pub extra_data: Vec<u8>,
    /// 码率 (bits/s)
    pub bit_rate: u64,
    /// 媒体类型特定参数
    pub params: CodecParamsType,
}

/// 媒体类型特定参数
#[derive(Debug, Clone)]
pub enum CodecParamsType {
    /// 视频参数
    Video(VideoCodecParams),
    /// 无特定参数
    None,
}

/// 视频编解码器参数
#[derive(Debug, Clone)]
pub struct VideoCodecParams {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 帧率
    pub frame_rate: Rational,
    /// 采样宽高比 (SAR)
    pub sample_aspect_ratio: Rational,
}

impl CodecParameters {
    /// 只带 extra_data 的参数, 其余字段由解码器从头包中得到
    pub fn from_extra_data(codec_id: CodecId, extra_data: Vec<u8>) -> Self {
        Self {
            codec_id,
            extra_data,
            bit_rate: 0,
            params: CodecParamsType::None,
        }
    }

    /// 获取视频参数 (如果是视频流)
    pub fn video(&self) -> Option<&VideoCodecParams> {
        match &self.params {
            CodecParamsType::Video(v) => Some(v),
            CodecParamsType::None => None,
        }
    }
}

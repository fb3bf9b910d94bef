//! 解码后的帧数据 (Frame).
//!
//! 对标 FFmpeg 的 `AVFrame`, 表示解码后的原始视频数据.

use tao_core::{
    PixelFormat, Rational,
    color::{ColorRange, ColorSpace},
};

/// 视频帧
///
/// 包含解码后的原始像素数据, 按平面存储, 行序自顶向下.
/// 例如 YUV420P 格式有 3 个平面: Y, U, V.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
    /// 帧时长 (以 time_base 为单位)
    pub duration: i64,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 图片类型
    pub picture_type: PictureType,
    /// 采样宽高比 (SAR)
    pub sample_aspect_ratio: Rational,
    /// 色彩空间
    pub color_space: ColorSpace,
    /// 色彩范围
    pub color_range: ColorRange,
}

impl VideoFrame {
    /// 创建空的视频帧
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let plane_count = pixel_format.plane_count() as usize;
        Self {
            data: vec![Vec::new(); plane_count],
            linesize: vec![0; plane_count],
            width,
            height,
            pixel_format,
            pts: tao_core::timestamp::NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
            duration: 0,
            is_keyframe: false,
            picture_type: PictureType::None,
            sample_aspect_ratio: Rational::new(1, 1),
            color_space: ColorSpace::default(),
            color_range: ColorRange::default(),
        }
    }

    /// 指定平面的第 `row` 行 (自顶向下)
    pub fn plane_row(&self, plane: usize, row: usize) -> &[u8] {
        let stride = self.linesize[plane];
        &self.data[plane][row * stride..(row + 1) * stride]
    }
}

/// 解码器输出的帧
#[derive(Debug, Clone)]
pub enum Frame {
    /// 视频帧
    Video(VideoFrame),
}

impl Frame {
    pub fn into_video(self) -> VideoFrame {
        match self {
            Self::Video(v) => v,
        }
    }
}

/// 图片类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PictureType {
    /// 未指定
    #[default]
    None,
    /// I 帧 (帧内编码)
    I,
    /// P 帧 (参考上一帧或黄金帧)
    P,
}

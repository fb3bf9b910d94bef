//! 像素格式定义.
//!
//! 对标 FFmpeg 的 `AVPixelFormat`. Theora 只产出三种 8 位 YUV 平面格式.

use std::fmt;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定
    None,
    /// YUV 4:2:0 平面格式, 8 位
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
}

impl PixelFormat {
    /// 获取色度子采样 (log2 水平, log2 垂直)
    ///
    /// 例如 YUV420 返回 (1, 1), 表示色度分辨率为亮度的 1/2 x 1/2.
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuv422p => (1, 0),
            Self::Yuv444p | Self::None => (0, 0),
        }
    }

    /// 平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
        }
    }

    /// 指定平面每行的字节数, 奇数宽度的色度平面向上取整
    ///
    /// 格式为 None 或平面索引越界时返回 None.
    pub fn plane_linesize(&self, plane: usize, width: u32) -> Option<usize> {
        if plane >= self.plane_count() as usize {
            return None;
        }
        let (sub_h, _) = self.chroma_subsampling();
        Some(if plane == 0 {
            width as usize
        } else {
            width.div_ceil(1 << sub_h) as usize
        })
    }

    /// 指定平面的行数, 奇数高度的色度平面向上取整
    pub fn plane_height(&self, plane: usize, height: u32) -> Option<usize> {
        if plane >= self.plane_count() as usize {
            return None;
        }
        let (_, sub_v) = self.chroma_subsampling();
        Some(if plane == 0 {
            height as usize
        } else {
            height.div_ceil(1 << sub_v) as usize
        })
    }

    /// 整帧的字节数
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        if *self == Self::None {
            return None;
        }
        let mut total = 0usize;
        for plane in 0..self.plane_count() as usize {
            total += self.plane_linesize(plane, width)? * self.plane_height(plane, height)?;
        }
        Some(total)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

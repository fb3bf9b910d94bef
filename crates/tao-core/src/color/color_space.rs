//! 色彩空间 (YCbCr 矩阵系数).

use std::fmt;

/// YCbCr 色彩空间
///
/// Theora 码流只能声明未指定, BT.470 M 或 BT.470 BG 三种.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ColorSpace {
    /// 未指定
    #[default]
    Unspecified,
    /// ITU-R BT.470 M (NTSC)
    Bt470m,
    /// ITU-R BT.470 BG (PAL/SECAM)
    Bt470bg,
}

impl ColorSpace {
    /// 名称, 与 Y4M/probe 输出使用的写法一致
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "unknown",
            Self::Bt470m => "bt470m",
            Self::Bt470bg => "bt470bg",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_色彩空间_名称() {
        assert_eq!(ColorSpace::default(), ColorSpace::Unspecified);
        assert_eq!(ColorSpace::Bt470m.to_string(), "bt470m");
        assert_eq!(ColorSpace::Bt470bg.name(), "bt470bg");
    }
}

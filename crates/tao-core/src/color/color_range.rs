//! 色彩范围.

/// 色彩范围
///
/// Theora 输出固定为有限范围: 8 位下 Y 16-235, Cb/Cr 16-240.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    /// 未指定
    #[default]
    Unspecified,
    /// 有限范围 (广播/TV)
    Limited,
    /// 完整范围 (JPEG/PC) Y 0-255
    Full,
}

impl ColorRange {
    /// YUV4MPEG2 `XCOLORRANGE` 扩展字段的取值, 未指定时为 None
    pub const fn y4m_tag(self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::Limited => Some("LIMITED"),
            Self::Full => Some("FULL"),
        }
    }
}

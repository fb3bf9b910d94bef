//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// Ogg
    Ogg,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[Self::Ogg];

    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
        }
    }

    /// 获取格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Ogg => &["ogg", "ogv", "ogx"],
        }
    }

    /// 根据文件扩展名猜测格式
    ///
    /// # 参数
    /// - `ext`: 文件扩展名 (不含 `.`, 如 "ogv")
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let ext = filename.rsplit('.').next()?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_格式标识_扩展名() {
        assert_eq!(FormatId::from_filename("clip.OGV"), Some(FormatId::Ogg));
        assert_eq!(FormatId::from_extension("mp4"), None);
        assert_eq!(FormatId::Ogg.to_string(), "ogg");
    }
}

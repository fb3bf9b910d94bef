//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 容器格式错误
    #[error("格式错误: {0}")]
    Format(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的编解码器
    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 容器页面丢失 (页面序号不连续或孤立的续接页)
    #[error("页面丢失: {0}")]
    LostPage(String),

    /// 数据包在流结束前未完整收尾
    #[error("数据包缺少结尾: {0}")]
    MissingEndOfPacket(String),

    /// 功能未实现
    #[error("功能未实现: {0}")]
    NotImplemented(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_错误信息_中文() {
        let err = TaoError::LostPage("流 #0 页面序号 3 -> 5".into());
        assert_eq!(err.to_string(), "页面丢失: 流 #0 页面序号 3 -> 5");
        let err = TaoError::MissingEndOfPacket("EOS 页".into());
        assert!(err.to_string().starts_with("数据包缺少结尾"));
    }

    #[test]
    fn test_io_错误自动转换() {
        fn open() -> TaoResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "x"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(TaoError::Io(_))));
    }
}

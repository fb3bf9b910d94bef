//! Theora 解码错误类型.

use tao_core::TaoError;
use thiserror::Error;

/// Theora 解码错误
#[derive(Debug, Error)]
pub enum TheoraError {
    /// 头包无效 (标识错误, 版本不支持, 字段越界等)
    #[error("Theora 头包无效: {0}")]
    InvalidHeader(String),

    /// 码流无法解码 (Huffman 树过大/过深, 量化范围非法等)
    #[error("Theora 码流无法解码: {0}")]
    UndecodableStream(String),

    /// 比特读取越过数据包末尾
    #[error("Theora 比特流耗尽: 需要 {needed} 位, 位置 {position}/{total}")]
    BitstreamExhausted {
        needed: u32,
        position: usize,
        total: usize,
    },

    /// 帧数据包无效
    #[error("Theora 帧数据包无效: {0}")]
    InvalidFramePacket(String),

    /// 像素格式保留值
    #[error("Theora 像素格式未知: {0}")]
    UnknownPixelFormat(u8),

    /// 容器页面丢失
    #[error("页面丢失: {0}")]
    LostPage(String),

    /// 数据包缺少结尾
    #[error("数据包缺少结尾: {0}")]
    MissingEndOfPacket(String),

    /// 来自数据源的其他错误
    #[error(transparent)]
    Source(TaoError),
}

/// Theora 解码 Result 类型
pub type TheoraResult<T> = Result<T, TheoraError>;

impl From<TaoError> for TheoraError {
    fn from(err: TaoError) -> Self {
        match err {
            TaoError::LostPage(msg) => Self::LostPage(msg),
            TaoError::MissingEndOfPacket(msg) => Self::MissingEndOfPacket(msg),
            other => Self::Source(other),
        }
    }
}

impl From<TheoraError> for TaoError {
    fn from(err: TheoraError) -> Self {
        match err {
            TheoraError::LostPage(msg) => TaoError::LostPage(msg),
            TheoraError::MissingEndOfPacket(msg) => TaoError::MissingEndOfPacket(msg),
            TheoraError::Source(inner) => inner,
            other => TaoError::InvalidData(other.to_string()),
        }
    }
}

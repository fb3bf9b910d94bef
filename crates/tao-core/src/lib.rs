//! # tao-core
//!
//! Tao 核心库, 提供各 crate 共用的基础类型与错误处理.
//!
//! 本 crate 对标 FFmpeg 的 libavutil.

pub mod bitwriter;
pub mod color;
pub mod error;
pub mod media_type;
pub mod pixel_format;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{TaoError, TaoResult};
pub use media_type::MediaType;
pub use pixel_format::PixelFormat;
pub use rational::Rational;
pub use timestamp::NOPTS_VALUE;

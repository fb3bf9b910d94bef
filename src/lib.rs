//! # Tao Theora
//!
//! 纯 Rust 实现的 Ogg Theora 视频解码库.
//!
//! - **容器**: Ogg 解封装, 严格校验 CRC 与页面序号
//! - **解码**: Theora 3.2 全部三种像素格式, 输出裁剪后的 YUV 平面
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao::codec::decoders::theora::TheoraStream;
//! use tao::format::OggTheoraSource;
//!
//! let source = OggTheoraSource::open("clip.ogv")?;
//! let mut stream = TheoraStream::new(source)?;
//! let id = &stream.headers().identification;
//! println!("{}x{} @ {:.3} fps", id.pic_width, id.pic_height, id.fps());
//! while let Some(frame) = stream.next_frame()? {
//!     println!("{:?}", frame.frame_type);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 核心类型与错误 |
//! | `tao-codec` | 解码器框架与 Theora 解码器 |
//! | `tao-format` | 字节 I/O 与 Ogg 解封装 |

pub mod logging;

/// 核心类型与工具 (对标 libavutil)
pub use tao_core as core;

/// 解码器框架 (对标 libavcodec)
pub use tao_codec as codec;

/// 容器格式框架 (对标 libavformat)
pub use tao_format as format;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> tao_codec::CodecRegistry {
    let mut registry = tao_codec::CodecRegistry::new();
    tao_codec::register_all(&mut registry);
    registry
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> tao_format::FormatRegistry {
    let mut registry = tao_format::FormatRegistry::new();
    tao_format::register_all(&mut registry);
    registry
}

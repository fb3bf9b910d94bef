//! # tao-codec
//!
//! Tao 编解码器库, 提供解码器框架, Packet/Frame 抽象与 Theora 解码器.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::{CodecId, CodecRegistry};
//!
//! let mut reg = CodecRegistry::new();
//! tao_codec::register_all(&mut reg);
//!
//! let decoder = reg.create_decoder(CodecId::Theora).unwrap();
//! assert_eq!(decoder.name(), "theora");
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{CodecParameters, CodecParamsType, VideoCodecParams};
pub use decoder::Decoder;
pub use frame::{Frame, PictureType, VideoFrame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}

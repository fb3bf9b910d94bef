//! # tao-format
//!
//! Tao 容器格式库: 字节 I/O, 解封装器框架与 Ogg 解封装.
//!
//! [`OggTheoraSource`] 把 Ogg 中的 Theora 逻辑流适配为解码器的数据包来源.

pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod probe;
pub mod registry;
pub mod stream;
pub mod theora_source;

// 重导出常用类型
pub use demuxer::{Demuxer, SeekFlags};
pub use demuxers::ogg::OggDemuxer;
pub use format_id::FormatId;
pub use io::IoContext;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::{Stream, StreamParams, VideoStreamParams};
pub use theora_source::OggTheoraSource;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
}

//! 解封装器 (Demuxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat`, 定义了从容器格式中读取数据包的接口.

use tao_codec::Packet;
use tao_core::TaoResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 从容器中按流序读取完整的压缩数据包 (跨页/跨段的数据已拼接好).
///
/// 使用流程:
/// 1. `open()` 解析开头的 BOS 页, 建立流列表
/// 2. `streams()` 获取流信息, `extra_data` 中带有码流头
/// 3. 循环调用 `read_packet()` 直到 `TaoError::Eof`
///
/// 容器层的丢页或数据包未收尾以 `TaoError::LostPage` / `TaoError::MissingEndOfPacket`
/// 返回, 调用方不应尝试重新同步.
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    ///
    /// 读取容器头部, 解析出所有流的信息.
    fn open(&mut self, io: &mut IoContext) -> TaoResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(TaoError::Eof)`: 已到达文件末尾
    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet>;

    /// 定位到指定时间点, 不支持定位的格式返回 `TaoError::Unsupported`
    ///
    /// # 参数
    /// - `stream_index`: 目标流索引
    /// - `timestamp`: 目标时间戳 (以流的 time_base 为单位)
    /// - `flags`: Seek 标志
    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        flags: SeekFlags,
    ) -> TaoResult<()>;

    /// 获取容器时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;

    /// 获取容器元数据
    fn metadata(&self) -> &[(String, String)] {
        &[]
    }
}

/// Seek 标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekFlags {
    /// 向后 seek (寻找目标之前最近的关键帧)
    pub backward: bool,
    /// 基于字节位置 seek (而非时间戳)
    pub byte: bool,
    /// 寻找任意帧 (不仅是关键帧)
    pub any: bool,
}

impl Default for SeekFlags {
    fn default() -> Self {
        Self {
            backward: true,
            byte: false,
            any: false,
        }
    }
}

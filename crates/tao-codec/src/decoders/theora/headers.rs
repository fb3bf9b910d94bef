//! Theora 三个头包解析: identification, comment, setup.

use log::debug;
use tao_core::color::ColorSpace;
use tao_core::{PixelFormat, Rational};

use super::bitreader::BitReader;
use super::error::{TheoraError, TheoraResult};
use super::huffman::{HuffmanTable, NUM_HUFFMAN_TABLES};
use super::quant::{QuantMatrices, QuantParams};

/// identification 头包固定长度
const IDENTIFICATION_LEN: usize = 42;

/// Theora 色度采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TheoraPixelFormat {
    /// 4:2:0, 色度水平垂直均减半
    Yuv420,
    /// 4:2:2, 色度水平减半
    Yuv422,
    /// 4:4:4
    Yuv444,
}

impl TheoraPixelFormat {
    /// 从头包中的 2 位字段解析, 1 为保留值
    pub fn from_bits(pf: u8) -> TheoraResult<Self> {
        match pf {
            0 => Ok(Self::Yuv420),
            2 => Ok(Self::Yuv422),
            3 => Ok(Self::Yuv444),
            other => Err(TheoraError::UnknownPixelFormat(other)),
        }
    }

    /// 头包中的原始取值
    pub fn bits(self) -> u8 {
        match self {
            Self::Yuv420 => 0,
            Self::Yuv422 => 2,
            Self::Yuv444 => 3,
        }
    }

    /// 对应的输出像素格式
    pub fn to_pixel_format(self) -> PixelFormat {
        match self {
            Self::Yuv420 => PixelFormat::Yuv420p,
            Self::Yuv422 => PixelFormat::Yuv422p,
            Self::Yuv444 => PixelFormat::Yuv444p,
        }
    }

    /// 色度平面是否水平减半
    pub fn chroma_halved_x(self) -> bool {
        self != Self::Yuv444
    }

    /// 色度平面是否垂直减半
    pub fn chroma_halved_y(self) -> bool {
        self == Self::Yuv420
    }
}

/// identification 头包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub version_revision: u8,
    /// 宏块列数 (FMBW)
    pub mb_width: u32,
    /// 宏块行数 (FMBH)
    pub mb_height: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    /// 图像区域左偏移
    pub pic_x: u32,
    /// 图像区域下偏移 (自底向上)
    pub pic_y: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub aspect_num: u32,
    pub aspect_den: u32,
    /// 色彩空间 (0 未定义, 1 Rec.470M, 2 Rec.470BG)
    pub colorspace: u8,
    /// 标称码率 (bit/s), 0 表示未指定
    pub bitrate: u32,
    pub quality: u8,
    /// 关键帧粒度位移 (granule position 中帧偏移的位数)
    pub kfgshift: u8,
    pub pixel_format: TheoraPixelFormat,
}

impl IdentificationHeader {
    /// 版本号, 例如 (3, 2, 1)
    pub fn version(&self) -> (u8, u8, u8) {
        (
            self.version_major,
            self.version_minor,
            self.version_revision,
        )
    }

    /// 编码帧宽度 (像素, 16 的倍数)
    pub fn frame_width(&self) -> u32 {
        self.mb_width * 16
    }

    /// 编码帧高度 (像素, 16 的倍数)
    pub fn frame_height(&self) -> u32 {
        self.mb_height * 16
    }

    /// 每秒帧数
    pub fn fps(&self) -> f64 {
        f64::from(self.frame_rate_num) / f64::from(self.frame_rate_den)
    }

    /// 帧率 (约分后, 超出 i32 时按比例缩小)
    pub fn frame_rate(&self) -> Rational {
        Rational::from_u32(self.frame_rate_num, self.frame_rate_den)
    }

    /// 像素宽高比, 未指定时为 1:1
    pub fn sample_aspect_ratio(&self) -> Rational {
        if self.aspect_num == 0 || self.aspect_den == 0 {
            return Rational::new(1, 1);
        }
        Rational::from_u32(self.aspect_num, self.aspect_den)
    }

    pub fn color_space(&self) -> ColorSpace {
        match self.colorspace {
            1 => ColorSpace::Bt470m,
            2 => ColorSpace::Bt470bg,
            _ => ColorSpace::Unspecified,
        }
    }

    /// 平面 pli 的块网格尺寸 (列数, 行数)
    pub fn plane_blocks(&self, pli: usize) -> (usize, usize) {
        let bw = self.mb_width as usize * 2;
        let bh = self.mb_height as usize * 2;
        if pli == 0 {
            return (bw, bh);
        }
        let cw = if self.pixel_format.chroma_halved_x() {
            bw / 2
        } else {
            bw
        };
        let ch = if self.pixel_format.chroma_halved_y() {
            bh / 2
        } else {
            bh
        };
        (cw, ch)
    }

    /// 平面 pli 的像素尺寸 (宽, 高)
    pub fn plane_size(&self, pli: usize) -> (usize, usize) {
        let (bw, bh) = self.plane_blocks(pli);
        (bw * 8, bh * 8)
    }

    /// 平面 pli 的超级块网格尺寸
    pub fn plane_super_blocks(&self, pli: usize) -> (usize, usize) {
        let (bw, bh) = self.plane_blocks(pli);
        (bw.div_ceil(4), bh.div_ceil(4))
    }

    /// 全部平面的块总数 (NBS)
    pub fn num_blocks(&self) -> usize {
        (0..3)
            .map(|pli| {
                let (bw, bh) = self.plane_blocks(pli);
                bw * bh
            })
            .sum()
    }

    /// 全部平面的超级块总数 (NSBS)
    pub fn num_super_blocks(&self) -> usize {
        (0..3)
            .map(|pli| {
                let (sw, sh) = self.plane_super_blocks(pli);
                sw * sh
            })
            .sum()
    }

    /// 宏块总数 (NMBS)
    pub fn num_macroblocks(&self) -> usize {
        self.mb_width as usize * self.mb_height as usize
    }
}

/// comment 头包
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentHeader {
    pub vendor: String,
    /// (键, 值) 列表, 键已转为小写
    pub comments: Vec<(String, String)>,
}

impl CommentHeader {
    /// 按键查找第一个匹配的值
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.comments
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// setup 头包
#[derive(Debug, Clone)]
pub struct SetupHeader {
    /// 环路滤波限值, 下标为 qi
    pub loop_filter_limits: [u8; 64],
    pub quant: QuantParams,
    pub(crate) huffman_tables: Vec<HuffmanTable>,
}

/// 三个头包解析后的完整信息
#[derive(Debug, Clone)]
pub struct TheoraHeaders {
    pub identification: IdentificationHeader,
    pub comment: CommentHeader,
    pub setup: SetupHeader,
    pub(crate) quant_matrices: QuantMatrices,
}

impl TheoraHeaders {
    pub fn new(
        identification: IdentificationHeader,
        comment: CommentHeader,
        setup: SetupHeader,
    ) -> Self {
        let quant_matrices = QuantMatrices::new(&setup.quant);
        Self {
            identification,
            comment,
            setup,
            quant_matrices,
        }
    }
}

/// 检查头包类型字节与 "theora" 标识
fn check_signature(packet: &[u8], packet_type: u8, what: &str) -> TheoraResult<()> {
    if packet.len() < 7 || packet[0] != packet_type || &packet[1..7] != b"theora" {
        return Err(TheoraError::InvalidHeader(format!("{what} 头包标识无效")));
    }
    Ok(())
}

/// 判断数据包是否为头包 (最高位为 1)
pub fn is_header_packet(packet: &[u8]) -> bool {
    packet.first().is_some_and(|b| b & 0x80 != 0)
}

/// 解析 identification 头包
pub fn parse_identification_header(packet: &[u8]) -> TheoraResult<IdentificationHeader> {
    check_signature(packet, 0x80, "identification")?;
    if packet.len() < IDENTIFICATION_LEN {
        return Err(TheoraError::InvalidHeader(format!(
            "identification 头包长度不足: {}",
            packet.len()
        )));
    }

    let mut br = BitReader::new(&packet[7..]);
    let version_major = br.read_bits(8)? as u8;
    let version_minor = br.read_bits(8)? as u8;
    let version_revision = br.read_bits(8)? as u8;
    if version_major != 3 || version_minor > 2 {
        return Err(TheoraError::InvalidHeader(format!(
            "不支持的版本: {version_major}.{version_minor}.{version_revision}"
        )));
    }

    let mb_width = br.next_bits(16)?;
    let mb_height = br.next_bits(16)?;
    if mb_width == 0 || mb_height == 0 {
        return Err(TheoraError::InvalidHeader(format!(
            "宏块尺寸无效: {mb_width}x{mb_height}"
        )));
    }

    let pic_width = br.next_bits(24)?;
    let pic_height = br.next_bits(24)?;
    let pic_x = br.read_bits(8)?;
    let pic_y = br.read_bits(8)?;
    let frame_width = mb_width * 16;
    let frame_height = mb_height * 16;
    if pic_width > frame_width
        || pic_height > frame_height
        || pic_x > frame_width - pic_width
        || pic_y > frame_height - pic_height
    {
        return Err(TheoraError::InvalidHeader(format!(
            "图像区域 {pic_width}x{pic_height}+{pic_x}+{pic_y} 超出帧 {frame_width}x{frame_height}"
        )));
    }

    let frame_rate_num = br.next_bits(32)?;
    let frame_rate_den = br.next_bits(32)?;
    if frame_rate_num == 0 || frame_rate_den == 0 {
        return Err(TheoraError::InvalidHeader(format!(
            "帧率无效: {frame_rate_num}/{frame_rate_den}"
        )));
    }
    let aspect_num = br.next_bits(24)?;
    let aspect_den = br.next_bits(24)?;
    let colorspace = br.read_bits(8)? as u8;
    let bitrate = br.next_bits(24)?;
    let quality = br.read_bits(6)? as u8;
    let kfgshift = br.read_bits(5)? as u8;
    let pixel_format = TheoraPixelFormat::from_bits(br.read_bits(2)? as u8)?;
    let reserved = br.read_bits(3)?;
    if reserved != 0 {
        return Err(TheoraError::InvalidHeader(format!(
            "identification 保留位非零: {reserved}"
        )));
    }

    let header = IdentificationHeader {
        version_major,
        version_minor,
        version_revision,
        mb_width,
        mb_height,
        pic_width,
        pic_height,
        pic_x,
        pic_y,
        frame_rate_num,
        frame_rate_den,
        aspect_num,
        aspect_den,
        colorspace,
        bitrate,
        quality,
        kfgshift,
        pixel_format,
    };
    debug!(
        "Theora identification: {}x{} (帧 {}x{}), {:?}, {:.3} fps",
        pic_width,
        pic_height,
        frame_width,
        frame_height,
        pixel_format,
        header.fps(),
    );
    Ok(header)
}

fn read_le_u32(packet: &[u8], pos: &mut usize) -> TheoraResult<u32> {
    let bytes = packet
        .get(*pos..*pos + 4)
        .ok_or_else(|| TheoraError::InvalidHeader("comment 头包截断".into()))?;
    *pos += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_string(packet: &[u8], pos: &mut usize) -> TheoraResult<String> {
    let len = read_le_u32(packet, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= packet.len())
        .ok_or_else(|| TheoraError::InvalidHeader(format!("comment 字符串长度越界: {len}")))?;
    let s = String::from_utf8_lossy(&packet[*pos..end]).into_owned();
    *pos = end;
    Ok(s)
}

/// 解析 comment 头包
pub fn parse_comment_header(packet: &[u8]) -> TheoraResult<CommentHeader> {
    check_signature(packet, 0x81, "comment")?;
    let mut pos = 7usize;
    let vendor = read_string(packet, &mut pos)?;
    let count = read_le_u32(packet, &mut pos)?;

    let mut comments = Vec::new();
    for _ in 0..count {
        let entry = read_string(packet, &mut pos)?;
        let (key, value) = match entry.split_once('=') {
            Some((k, v)) => (k, v),
            None => (entry.as_str(), ""),
        };
        if key.is_empty() {
            continue;
        }
        comments.push((key.to_ascii_lowercase(), value.to_string()));
    }

    debug!("Theora comment: vendor={vendor}, {} 条注释", comments.len());
    Ok(CommentHeader { vendor, comments })
}

/// 解析 setup 头包
pub fn parse_setup_header(packet: &[u8]) -> TheoraResult<SetupHeader> {
    check_signature(packet, 0x82, "setup")?;
    let mut br = BitReader::new(&packet[7..]);

    let nbits = br.read_bits(3)?;
    let mut loop_filter_limits = [0u8; 64];
    for v in loop_filter_limits.iter_mut() {
        *v = br.read_bits(nbits)? as u8;
    }

    let quant = QuantParams::read(&mut br)?;

    let mut huffman_tables = Vec::with_capacity(NUM_HUFFMAN_TABLES);
    for _ in 0..NUM_HUFFMAN_TABLES {
        huffman_tables.push(HuffmanTable::read(&mut br)?);
    }

    debug!(
        "Theora setup: {} 个基础矩阵, {} 张码表, 已读 {} 位",
        quant.base_matrices.len(),
        huffman_tables.len(),
        br.position(),
    );
    Ok(SetupHeader {
        loop_filter_limits,
        quant,
        huffman_tables,
    })
}

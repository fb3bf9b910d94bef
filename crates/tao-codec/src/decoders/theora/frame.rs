//! 帧数据包解码.
//!
//! 解码严格按以下顺序进行, 每一步依赖前一步的结果:
//! 帧头 -> 块编码标志 -> 宏块模式 -> 运动矢量 -> 块 qi 索引 -> DCT token
//! -> DC 预测 -> 像素重建 -> 环路滤波

use log::trace;

use super::bitreader::BitReader;
use super::dc::predict_dc;
use super::error::{TheoraError, TheoraResult};
use super::headers::{TheoraHeaders, TheoraPixelFormat};
use super::huffman::{LONG_RUN, MODE_RANK, MOTION_VECTOR, SHORT_RUN, StaticHuffman, RunCode};
use super::loop_filter::apply_loop_filter;
use super::mapping::MappingTables;
use super::recon::reconstruct;
use super::tables::{MODE_SCHEMES, TOKEN_MAGNITUDE_BASE, TOKEN_MAGNITUDE_BITS, huffman_group};

/// 长游程达到该长度后, 下一段的比特值需重新读取
const MAX_LONG_RUN: usize = 4129;

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// 帧内帧 (关键帧)
    Intra,
    /// 帧间帧
    Inter,
}

/// 宏块编码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodingMode {
    /// 参考上一帧, 无运动矢量
    #[default]
    InterNoMv,
    /// 帧内编码
    Intra,
    /// 参考上一帧, 显式运动矢量
    InterMv,
    /// 参考上一帧, 沿用最近一个运动矢量
    InterMvLast,
    /// 参考上一帧, 沿用倒数第二个运动矢量
    InterMvLast2,
    /// 参考黄金帧, 无运动矢量
    InterGoldenNoMv,
    /// 参考黄金帧, 显式运动矢量
    InterGoldenMv,
    /// 参考上一帧, 4 个亮度块各自带运动矢量
    InterMvFour,
}

impl CodingMode {
    fn from_index(index: u8) -> Self {
        match index {
            0 => Self::InterNoMv,
            1 => Self::Intra,
            2 => Self::InterMv,
            3 => Self::InterMvLast,
            4 => Self::InterMvLast2,
            5 => Self::InterGoldenNoMv,
            6 => Self::InterGoldenMv,
            _ => Self::InterMvFour,
        }
    }

    /// 参考帧编号: 0 帧内, 1 上一帧, 2 黄金帧
    pub fn reference_index(self) -> usize {
        match self {
            Self::Intra => 0,
            Self::InterGoldenNoMv | Self::InterGoldenMv => 2,
            _ => 1,
        }
    }
}

/// 运动矢量, 亮度平面以半像素为单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
}

impl MotionVector {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 8 位像素平面, 第 0 行为图像底行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Plane {
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    /// 坐标越界时取最近的边缘像素
    pub fn at_clamped(&self, x: isize, y: isize) -> u8 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.at(x, y)
    }

    /// 第 y 行 (自底向上计数)
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

/// 解码完成的一帧
#[derive(Debug, Clone)]
pub struct TheoraFrame {
    pub frame_type: FrameType,
    /// 帧级 qi 列表 (1..=3 个)
    pub qis: Vec<u8>,
    /// Y, Cb, Cr 三个平面, 尺寸为完整编码帧
    pub planes: [Plane; 3],
    /// 本帧重建过的亮度像素坐标 (x, y), y 自底向上
    pub changed_pixels: Vec<(u32, u32)>,
    /// 以下逐块数组均按编码序
    pub(crate) coded: Vec<bool>,
    /// 逐宏块 (编码序)
    pub(crate) modes: Vec<CodingMode>,
    pub(crate) mvs: Vec<MotionVector>,
    pub(crate) qiis: Vec<u8>,
    /// 之字形序的量化系数
    pub(crate) coeffs: Vec<[i16; 64]>,
    pub(crate) ncoeffs: Vec<u8>,
}

impl TheoraFrame {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type == FrameType::Intra
    }

    /// 编码序块号是否已编码
    pub fn is_block_coded(&self, bi: usize) -> bool {
        self.coded[bi]
    }

    /// 已编码块数量
    pub fn coded_block_count(&self) -> usize {
        self.coded.iter().filter(|&&c| c).count()
    }

    /// 编码序宏块的编码模式
    pub fn macroblock_mode(&self, mbi: usize) -> CodingMode {
        self.modes[mbi]
    }

    /// 编码序块号的运动矢量
    pub fn motion_vector(&self, bi: usize) -> MotionVector {
        self.mvs[bi]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DecodeStage {
    Header,
    CodedBlocks,
    Modes,
    MotionVectors,
    BlockQis,
    Tokens,
    DcPrediction,
    Reconstruction,
    LoopFilter,
}

/// token 展开结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenRun {
    /// EOB 游程: 当前块及后续若干块结束
    EndOfBlocks(usize),
    /// 纯零游程
    Zeros(usize),
    /// 若干个零之后跟一个非零系数
    Value { zeros: usize, value: i32 },
}

/// 读取一段游程编码的比特串
fn read_run_bits(
    br: &mut BitReader<'_>,
    count: usize,
    table: &StaticHuffman<RunCode>,
    long: bool,
) -> TheoraResult<Vec<bool>> {
    let mut bits = Vec::with_capacity(count);
    if count == 0 {
        return Ok(bits);
    }
    let mut bit = br.read_flag()?;
    loop {
        let code = table.decode(br)?;
        let run = (code.base + br.next_bits(code.extra_bits)?) as usize;
        if bits.len() + run > count {
            return Err(TheoraError::InvalidFramePacket(format!(
                "游程越界: 已有 {} 位, 游程 {run}, 总数 {count}",
                bits.len()
            )));
        }
        bits.extend(std::iter::repeat_n(bit, run));
        if bits.len() == count {
            return Ok(bits);
        }
        if long && run == MAX_LONG_RUN {
            bit = br.read_flag()?;
        } else {
            bit = !bit;
        }
    }
}

fn read_token_run(token: u8, br: &mut BitReader<'_>) -> TheoraResult<TokenRun> {
    let sign = |br: &mut BitReader<'_>| -> TheoraResult<i32> {
        Ok(if br.read_flag()? { -1 } else { 1 })
    };
    let run = match token {
        0..=2 => TokenRun::EndOfBlocks(token as usize + 1),
        3 => TokenRun::EndOfBlocks(4 + br.read_bits(2)? as usize),
        4 => TokenRun::EndOfBlocks(8 + br.read_bits(3)? as usize),
        5 => TokenRun::EndOfBlocks(16 + br.read_bits(4)? as usize),
        6 => match br.next_bits(12)? as usize {
            0 => TokenRun::EndOfBlocks(usize::MAX),
            n => TokenRun::EndOfBlocks(n),
        },
        7 => TokenRun::Zeros(br.read_bits(3)? as usize + 1),
        8 => TokenRun::Zeros(br.read_bits(6)? as usize + 1),
        9 => TokenRun::Value { zeros: 0, value: 1 },
        10 => TokenRun::Value { zeros: 0, value: -1 },
        11 => TokenRun::Value { zeros: 0, value: 2 },
        12 => TokenRun::Value { zeros: 0, value: -2 },
        13..=16 => {
            let mag = i32::from(token) - 10;
            TokenRun::Value {
                zeros: 0,
                value: mag * sign(br)?,
            }
        }
        17..=22 => {
            let i = usize::from(token - 17);
            let s = sign(br)?;
            let mag = TOKEN_MAGNITUDE_BASE[i] + br.next_bits(TOKEN_MAGNITUDE_BITS[i])? as i32;
            TokenRun::Value {
                zeros: 0,
                value: mag * s,
            }
        }
        23..=27 => TokenRun::Value {
            zeros: usize::from(token - 22),
            value: sign(br)?,
        },
        28 => {
            let s = sign(br)?;
            TokenRun::Value {
                zeros: 6 + br.read_bits(2)? as usize,
                value: s,
            }
        }
        29 => {
            let s = sign(br)?;
            TokenRun::Value {
                zeros: 10 + br.read_bits(3)? as usize,
                value: s,
            }
        }
        30 => {
            let s = sign(br)?;
            let mag = 2 + br.read_bits(1)? as i32;
            TokenRun::Value {
                zeros: 1,
                value: mag * s,
            }
        }
        31 => {
            let s = sign(br)?;
            let mag = 2 + br.read_bits(1)? as i32;
            let zeros = 2 + br.read_bits(1)? as usize;
            TokenRun::Value {
                zeros,
                value: mag * s,
            }
        }
        other => {
            return Err(TheoraError::InvalidFramePacket(format!(
                "DCT token 越界: {other}"
            )));
        }
    };
    Ok(run)
}

fn read_motion_component(br: &mut BitReader<'_>, raw: bool) -> TheoraResult<i32> {
    if raw {
        let mag = br.read_bits(5)? as i32;
        Ok(if br.read_flag()? { -mag } else { mag })
    } else {
        MOTION_VECTOR.decode(br)
    }
}

/// 4:2:0 色度运动矢量: 4 个亮度矢量之和除以 4, 远离零舍入
fn average4(sum: i32) -> i32 {
    (sum + if sum < 0 { -1 } else { 0 } + 2) >> 2
}

/// 4:2:2 色度运动矢量: 2 个亮度矢量之和除以 2, 远离零舍入
fn average2(sum: i32) -> i32 {
    (sum + if sum < 0 { -1 } else { 0 } + 1) >> 1
}

/// 单帧解码器, 借用头信息, 映射表与参考帧
pub(crate) struct FrameDecoder<'a> {
    headers: &'a TheoraHeaders,
    mapping: &'a MappingTables,
    previous: Option<&'a TheoraFrame>,
    golden: Option<&'a TheoraFrame>,
    stage: DecodeStage,
    frame: TheoraFrame,
}

impl<'a> FrameDecoder<'a> {
    fn new(
        headers: &'a TheoraHeaders,
        mapping: &'a MappingTables,
        previous: Option<&'a TheoraFrame>,
        golden: Option<&'a TheoraFrame>,
        frame_type: FrameType,
        qis: Vec<u8>,
    ) -> TheoraResult<Self> {
        let id = &headers.identification;
        let planes = match (frame_type, previous) {
            (FrameType::Inter, Some(prev)) => prev.planes.clone(),
            (FrameType::Inter, None) => {
                return Err(TheoraError::InvalidFramePacket(
                    "帧间帧缺少参考帧".into(),
                ));
            }
            (FrameType::Intra, _) => std::array::from_fn(|pli| {
                let (w, h) = id.plane_size(pli);
                Plane::new(w, h, 0)
            }),
        };

        let nblocks = mapping.num_blocks();
        Ok(Self {
            headers,
            mapping,
            previous,
            golden,
            stage: DecodeStage::Header,
            frame: TheoraFrame {
                frame_type,
                qis,
                planes,
                changed_pixels: Vec::new(),
                coded: vec![false; nblocks],
                modes: vec![CodingMode::InterNoMv; mapping.macroblocks.len()],
                mvs: vec![MotionVector::default(); nblocks],
                qiis: vec![0; nblocks],
                coeffs: vec![[0i16; 64]; nblocks],
                ncoeffs: vec![0; nblocks],
            },
        })
    }

    fn enter(&mut self, next: DecodeStage) -> TheoraResult<()> {
        if next <= self.stage {
            return Err(TheoraError::Source(tao_core::TaoError::Internal(format!(
                "解码阶段顺序错误: {:?} -> {next:?}",
                self.stage
            ))));
        }
        self.stage = next;
        Ok(())
    }

    fn is_intra(&self) -> bool {
        self.frame.frame_type == FrameType::Intra
    }

    /// 解码一个完整的帧数据包
    pub(crate) fn decode(
        headers: &'a TheoraHeaders,
        mapping: &'a MappingTables,
        previous: Option<&'a TheoraFrame>,
        golden: Option<&'a TheoraFrame>,
        packet: &[u8],
    ) -> TheoraResult<TheoraFrame> {
        let mut br = BitReader::new(packet);
        let (frame_type, qis) = read_frame_header(&mut br)?;
        let mut dec = Self::new(headers, mapping, previous, golden, frame_type, qis)?;

        dec.decode_coded_blocks(&mut br)?;
        dec.decode_modes(&mut br)?;
        dec.decode_motion_vectors(&mut br)?;
        dec.decode_block_qis(&mut br)?;
        dec.decode_tokens(&mut br)?;

        dec.enter(DecodeStage::DcPrediction)?;
        predict_dc(dec.mapping, &mut dec.frame);

        dec.enter(DecodeStage::Reconstruction)?;
        reconstruct(dec.headers, dec.mapping, dec.previous, dec.golden, &mut dec.frame)?;

        dec.enter(DecodeStage::LoopFilter)?;
        let limit = headers.setup.loop_filter_limits[dec.frame.qis[0] as usize];
        apply_loop_filter(dec.mapping, &mut dec.frame, limit);

        trace!(
            "Theora 帧解码完成: {:?}, qi={:?}, {}/{} 块已编码, 读取 {} 位",
            dec.frame.frame_type,
            dec.frame.qis,
            dec.frame.coded_block_count(),
            mapping.num_blocks(),
            br.position(),
        );
        Ok(dec.frame)
    }

    fn decode_coded_blocks(&mut self, br: &mut BitReader<'_>) -> TheoraResult<()> {
        self.enter(DecodeStage::CodedBlocks)?;
        if self.is_intra() {
            self.frame.coded.fill(true);
            return Ok(());
        }

        let nsbs = self.mapping.num_super_blocks();
        let partial = read_run_bits(br, nsbs, &LONG_RUN, true)?;
        let not_partial = partial.iter().filter(|&&p| !p).count();
        let full_flags = read_run_bits(br, not_partial, &LONG_RUN, true)?;

        let mut full = vec![false; nsbs];
        let mut full_iter = full_flags.into_iter();
        for (sbi, &p) in partial.iter().enumerate() {
            if !p {
                full[sbi] = full_iter.next().unwrap_or(false);
            }
        }

        let partial_blocks: usize = self
            .mapping
            .sb_sizes
            .iter()
            .zip(&partial)
            .filter(|&(_, &p)| p)
            .map(|(&size, _)| size as usize)
            .sum();
        let block_flags = read_run_bits(br, partial_blocks, &SHORT_RUN, false)?;
        let mut block_iter = block_flags.into_iter();

        for (bi, coded) in self.frame.coded.iter_mut().enumerate() {
            let sbi = self.mapping.block_sb[bi];
            *coded = if partial[sbi] {
                block_iter.next().unwrap_or(false)
            } else {
                full[sbi]
            };
        }
        Ok(())
    }

    fn decode_modes(&mut self, br: &mut BitReader<'_>) -> TheoraResult<()> {
        self.enter(DecodeStage::Modes)?;
        if self.is_intra() {
            self.frame.modes.fill(CodingMode::Intra);
            return Ok(());
        }

        let scheme = br.read_bits(3)? as usize;
        let alphabet: [u8; 8] = match scheme {
            0 => {
                let mut alphabet = [0u8; 8];
                for mode in 0..8u8 {
                    alphabet[br.read_bits(3)? as usize] = mode;
                }
                alphabet
            }
            1..=6 => MODE_SCHEMES[scheme - 1],
            _ => [0, 1, 2, 3, 4, 5, 6, 7],
        };

        for (mbi, mb) in self.mapping.macroblocks.iter().enumerate() {
            let has_coded_luma = mb.luma.iter().any(|&bi| self.frame.coded[bi]);
            self.frame.modes[mbi] = if !has_coded_luma {
                CodingMode::InterNoMv
            } else if scheme == 7 {
                CodingMode::from_index(br.read_bits(3)? as u8)
            } else {
                let rank = MODE_RANK.decode(br)?;
                CodingMode::from_index(alphabet[rank as usize])
            };
        }
        Ok(())
    }

    fn decode_motion_vectors(&mut self, br: &mut BitReader<'_>) -> TheoraResult<()> {
        self.enter(DecodeStage::MotionVectors)?;
        if self.is_intra() {
            return Ok(());
        }

        let raw = br.read_flag()?;
        let read_mv = |br: &mut BitReader<'_>| -> TheoraResult<MotionVector> {
            let x = read_motion_component(br, raw)?;
            let y = read_motion_component(br, raw)?;
            Ok(MotionVector::new(x, y))
        };
        let pixel_format = self.headers.identification.pixel_format;
        let mut last1 = MotionVector::default();
        let mut last2 = MotionVector::default();

        for (mbi, mb) in self.mapping.macroblocks.iter().enumerate() {
            let mv = match self.frame.modes[mbi] {
                CodingMode::InterMvFour => {
                    let mut luma_mvs = [MotionVector::default(); 4];
                    let mut last_coded = None;
                    for (i, &bi) in mb.luma.iter().enumerate() {
                        if self.frame.coded[bi] {
                            let mv = read_mv(br)?;
                            luma_mvs[i] = mv;
                            last_coded = Some(mv);
                        }
                        self.frame.mvs[bi] = luma_mvs[i];
                    }
                    let chroma_mvs = chroma_vectors(pixel_format, &luma_mvs);
                    let per_plane = mb.chroma.len() / 2;
                    for (i, &bi) in mb.chroma.iter().enumerate() {
                        self.frame.mvs[bi] = chroma_mvs[i % per_plane];
                    }
                    if let Some(mv) = last_coded {
                        last2 = last1;
                        last1 = mv;
                    }
                    continue;
                }
                CodingMode::InterMv => {
                    let mv = read_mv(br)?;
                    last2 = last1;
                    last1 = mv;
                    mv
                }
                CodingMode::InterMvLast => last1,
                CodingMode::InterMvLast2 => {
                    let mv = last2;
                    last2 = last1;
                    last1 = mv;
                    mv
                }
                CodingMode::InterGoldenMv => read_mv(br)?,
                _ => MotionVector::default(),
            };
            for &bi in mb.luma.iter().chain(&mb.chroma) {
                self.frame.mvs[bi] = mv;
            }
        }
        Ok(())
    }

    fn decode_block_qis(&mut self, br: &mut BitReader<'_>) -> TheoraResult<()> {
        self.enter(DecodeStage::BlockQis)?;
        let nqis = self.frame.qis.len();
        if nqis == 1 {
            return Ok(());
        }

        let coded: Vec<usize> = (0..self.mapping.num_blocks())
            .filter(|&bi| self.frame.coded[bi])
            .collect();
        let bits = read_run_bits(br, coded.len(), &LONG_RUN, true)?;
        for (&bi, &b) in coded.iter().zip(&bits) {
            self.frame.qiis[bi] = u8::from(b);
        }

        if nqis == 3 {
            let ones: Vec<usize> = coded
                .iter()
                .copied()
                .filter(|&bi| self.frame.qiis[bi] == 1)
                .collect();
            let bits = read_run_bits(br, ones.len(), &LONG_RUN, true)?;
            for (&bi, &b) in ones.iter().zip(&bits) {
                self.frame.qiis[bi] += u8::from(b);
            }
        }
        Ok(())
    }

    fn decode_tokens(&mut self, br: &mut BitReader<'_>) -> TheoraResult<()> {
        self.enter(DecodeStage::Tokens)?;
        let coded: Vec<usize> = (0..self.mapping.num_blocks())
            .filter(|&bi| self.frame.coded[bi])
            .collect();
        let planes: Vec<usize> = coded.iter().map(|&bi| self.mapping.plane_of(bi)).collect();
        let tables = &self.headers.setup.huffman_tables;

        // 每块下一个待解码的之字形序号, 64 表示已结束
        let mut tis = vec![0usize; self.mapping.num_blocks()];
        let mut eob_run = 0usize;
        let mut luma_table = 0usize;
        let mut chroma_table = 0usize;

        for ti in 0..64 {
            if ti <= 1 {
                luma_table = br.read_bits(4)? as usize;
                chroma_table = br.read_bits(4)? as usize;
            }
            let group = huffman_group(ti);

            for (&bi, &pli) in coded.iter().zip(&planes) {
                if tis[bi] != ti {
                    continue;
                }
                if eob_run > 0 {
                    self.frame.ncoeffs[bi] = ti as u8;
                    tis[bi] = 64;
                    eob_run -= 1;
                    continue;
                }

                let hti = 16 * group + if pli == 0 { luma_table } else { chroma_table };
                let token = tables[hti].decode(br)?;
                match read_token_run(token, br)? {
                    TokenRun::EndOfBlocks(run) => {
                        self.frame.ncoeffs[bi] = ti as u8;
                        tis[bi] = 64;
                        eob_run = run - 1;
                    }
                    TokenRun::Zeros(zeros) => {
                        let next = ti + zeros;
                        if next > 64 {
                            return Err(TheoraError::InvalidFramePacket(format!(
                                "零游程越过块末尾: {ti} + {zeros}"
                            )));
                        }
                        tis[bi] = next;
                    }
                    TokenRun::Value { zeros, value } => {
                        let zzi = ti + zeros;
                        if zzi >= 64 {
                            return Err(TheoraError::InvalidFramePacket(format!(
                                "系数下标越界: {zzi}"
                            )));
                        }
                        self.frame.coeffs[bi][zzi] = value as i16;
                        tis[bi] = zzi + 1;
                    }
                }
                if tis[bi] == 64 && self.frame.ncoeffs[bi] == 0 {
                    self.frame.ncoeffs[bi] = 64;
                }
            }
        }
        Ok(())
    }
}

/// 读取帧头, 返回帧类型与 qi 列表
fn read_frame_header(br: &mut BitReader<'_>) -> TheoraResult<(FrameType, Vec<u8>)> {
    if br.read_flag()? {
        return Err(TheoraError::InvalidFramePacket(
            "数据包首位为 1, 不是帧数据".into(),
        ));
    }
    let frame_type = if br.read_flag()? {
        FrameType::Inter
    } else {
        FrameType::Intra
    };

    let mut qis = vec![br.read_bits(6)? as u8];
    while qis.len() < 3 && br.read_flag()? {
        qis.push(br.read_bits(6)? as u8);
    }

    if frame_type == FrameType::Intra {
        let reserved = br.read_bits(3)?;
        if reserved != 0 {
            return Err(TheoraError::InvalidFramePacket(format!(
                "帧内帧保留位非零: {reserved}"
            )));
        }
    }
    Ok((frame_type, qis))
}

/// 由 4 个亮度块运动矢量推导色度块运动矢量, 顺序与宏块内单平面色度块一致
fn chroma_vectors(pixel_format: TheoraPixelFormat, luma: &[MotionVector; 4]) -> Vec<MotionVector> {
    match pixel_format {
        TheoraPixelFormat::Yuv420 => {
            let sx: i32 = luma.iter().map(|mv| mv.x).sum();
            let sy: i32 = luma.iter().map(|mv| mv.y).sum();
            vec![MotionVector::new(average4(sx), average4(sy))]
        }
        TheoraPixelFormat::Yuv422 => [(0, 1), (2, 3)]
            .iter()
            .map(|&(a, b)| {
                MotionVector::new(
                    average2(luma[a].x + luma[b].x),
                    average2(luma[a].y + luma[b].y),
                )
            })
            .collect(),
        TheoraPixelFormat::Yuv444 => luma.to_vec(),
    }
}

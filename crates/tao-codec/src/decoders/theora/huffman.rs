//! Theora 前缀码.
//!
//! - `StaticHuffman`: 码流规范中的固定码表 (游程长度, 模式序号, 运动矢量)
//! - `HuffmanTable`: setup 头中传输的 80 张 DCT token 码表

use super::bitreader::BitReader;
use super::error::{TheoraError, TheoraResult};

/// 码字最大长度
pub(crate) const MAX_CODE_LEN: usize = 32;
/// 单张码表最多叶子数
pub(crate) const MAX_LEAVES: usize = 32;
/// setup 头中的码表数量
pub(crate) const NUM_HUFFMAN_TABLES: usize = 80;

/// 固定码表
///
/// `rows[len - 1] = (offset, symbols)`: 长度为 len 的码字 c 满足
/// `offset <= c < offset + symbols.len()` 时解码为 `symbols[c - offset]`.
pub(crate) struct StaticHuffman<T: 'static> {
    rows: &'static [(u32, &'static [T])],
}

impl<T: Copy> StaticHuffman<T> {
    pub(crate) const fn new(rows: &'static [(u32, &'static [T])]) -> Self {
        Self { rows }
    }

    pub(crate) fn decode(&self, br: &mut BitReader<'_>) -> TheoraResult<T> {
        let mut code = 0u32;
        for &(offset, symbols) in self.rows {
            code = (code << 1) | br.read_bits(1)?;
            if code >= offset && ((code - offset) as usize) < symbols.len() {
                return Ok(symbols[(code - offset) as usize]);
            }
        }
        Err(TheoraError::UndecodableStream(format!(
            "固定码表中不存在码字 {code:#b}"
        )))
    }
}

/// 游程长度前缀: 基础长度与附加位数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunCode {
    pub(crate) base: u32,
    pub(crate) extra_bits: u32,
}

const fn rc(base: u32, extra_bits: u32) -> RunCode {
    RunCode { base, extra_bits }
}

/// 长游程码表 (超级块标志, qi 索引)
pub(crate) static LONG_RUN: StaticHuffman<RunCode> = StaticHuffman::new(&[
    (0, &[rc(1, 0)]),
    (2, &[rc(2, 1)]),
    (6, &[rc(4, 1)]),
    (14, &[rc(6, 2)]),
    (30, &[rc(10, 3)]),
    (62, &[rc(18, 4), rc(34, 12)]),
]);

/// 短游程码表 (块编码标志)
pub(crate) static SHORT_RUN: StaticHuffman<RunCode> = StaticHuffman::new(&[
    (0, &[rc(1, 1)]),
    (2, &[rc(3, 1)]),
    (6, &[rc(5, 1)]),
    (14, &[rc(7, 2)]),
    (30, &[rc(11, 2), rc(15, 4)]),
]);

/// 宏块模式序号码表
pub(crate) static MODE_RANK: StaticHuffman<u8> = StaticHuffman::new(&[
    (0, &[0]),
    (2, &[1]),
    (6, &[2]),
    (14, &[3]),
    (30, &[4]),
    (62, &[5]),
    (126, &[6, 7]),
]);

/// 运动矢量分量码表
pub(crate) static MOTION_VECTOR: StaticHuffman<i32> = StaticHuffman::new(&[
    (0, &[]),
    (0, &[]),
    (0, &[0, 1, -1]),
    (6, &[2, -2, 3, -3]),
    (0, &[]),
    (40, &[4, -4, 5, -5, 6, -6, 7, -7]),
    (
        96,
        &[
            8, -8, 9, -9, 10, -10, 11, -11, 12, -12, 13, -13, 14, -14, 15, -15,
        ],
    ),
    (
        224,
        &[
            16, -16, 17, -17, 18, -18, 19, -19, 20, -20, 21, -21, 22, -22, 23, -23, 24, -24, 25,
            -25, 26, -26, 27, -27, 28, -28, 29, -29, 30, -30, 31, -31,
        ],
    ),
]);

/// 动态码表
///
/// 按码长稀疏存储: `rows[len - 1]` 为该长度下的 (码字, token) 列表.
/// 根节点即叶子时 `root_token` 有值, 解码不消耗比特.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    rows: [Vec<(u32, u8)>; MAX_CODE_LEN],
    root_token: Option<u8>,
}

impl HuffmanTable {
    /// 从 setup 头读取一棵码树 (先序遍历, 显式栈)
    pub(crate) fn read(br: &mut BitReader<'_>) -> TheoraResult<Self> {
        let mut table = Self {
            rows: std::array::from_fn(|_| Vec::new()),
            root_token: None,
        };
        let mut leaves = 0usize;
        // (码字, 码长)
        let mut stack: Vec<(u32, usize)> = vec![(0, 0)];

        while let Some((code, len)) = stack.pop() {
            if br.read_flag()? {
                leaves += 1;
                if leaves > MAX_LEAVES {
                    return Err(TheoraError::UndecodableStream(
                        "Huffman 码表叶子数超过 32".into(),
                    ));
                }
                let token = br.read_bits(5)? as u8;
                if len == 0 {
                    table.root_token = Some(token);
                } else {
                    table.rows[len - 1].push((code, token));
                }
            } else {
                if len >= MAX_CODE_LEN {
                    return Err(TheoraError::UndecodableStream(
                        "Huffman 码树深度超过 32".into(),
                    ));
                }
                // 先处理 0 分支
                stack.push(((code << 1) | 1, len + 1));
                stack.push((code << 1, len + 1));
            }
        }
        Ok(table)
    }

    pub(crate) fn decode(&self, br: &mut BitReader<'_>) -> TheoraResult<u8> {
        if let Some(token) = self.root_token {
            return Ok(token);
        }
        let mut code = 0u32;
        for row in &self.rows {
            code = (code << 1) | br.read_bits(1)?;
            if let Some(&(_, token)) = row.iter().find(|&&(c, _)| c == code) {
                return Ok(token);
            }
        }
        Err(TheoraError::InvalidFramePacket(format!(
            "DCT token 码字无效: {code:#b}"
        )))
    }

    /// 叶子总数
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum::<usize>() + usize::from(self.root_token.is_some())
    }
}

//! Theora MSB 优先比特读取器.
//!
//! 内部维护一个 16 位前瞻窗口 (当前字节在高 8 位, 下一字节在低 8 位),
//! 单次 `read_bits` 最多取 8 位, `next_bits` 以 8 位为单位拼接出最多 32 位.

use super::error::{TheoraError, TheoraResult};

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    next_byte: usize,
    window: u16,
    bit_offset: u32,
    consumed: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let hi = data.first().copied().unwrap_or(0);
        let lo = data.get(1).copied().unwrap_or(0);
        Self {
            data,
            next_byte: 2,
            window: u16::from_be_bytes([hi, lo]),
            bit_offset: 0,
            consumed: 0,
        }
    }

    fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// 读取 n (<= 8) 位
    pub(crate) fn read_bits(&mut self, n: u32) -> TheoraResult<u32> {
        debug_assert!(n <= 8);
        if n == 0 {
            return Ok(0);
        }
        if self.consumed + n as usize > self.total_bits() {
            return Err(TheoraError::BitstreamExhausted {
                needed: n,
                position: self.consumed,
                total: self.total_bits(),
            });
        }

        let shifted = (u32::from(self.window) << self.bit_offset) & 0xFFFF;
        let value = shifted >> (16 - n);

        self.bit_offset += n;
        while self.bit_offset >= 8 {
            let incoming = self.data.get(self.next_byte).copied().unwrap_or(0);
            self.window = (self.window << 8) | u16::from(incoming);
            self.next_byte += 1;
            self.bit_offset -= 8;
        }
        self.consumed += n as usize;
        Ok(value)
    }

    /// 读取 n (<= 32) 位, 按 8 位分块拼接
    ///
    /// 结果按无符号数返回, 32 位字段的最高位不作符号位, 即无符号读取.
    pub(crate) fn next_bits(&mut self, n: u32) -> TheoraResult<u32> {
        debug_assert!(n <= 32);
        let mut remaining = n;
        let mut value = 0u32;
        while remaining > 0 {
            let chunk = remaining.min(8);
            value = (value << chunk) | self.read_bits(chunk)?;
            remaining -= chunk;
        }
        Ok(value)
    }

    pub(crate) fn read_flag(&mut self) -> TheoraResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 已消耗的比特数
    pub(crate) fn position(&self) -> usize {
        self.consumed
    }

    /// 是否已读完全部数据
    #[cfg(test)]
    pub(crate) fn is_eos(&self) -> bool {
        self.consumed == self.total_bits()
    }
}

/// 表示 v 所需的最少位数, ilog(0) = 0
pub(crate) fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_比特读取_msb_优先() {
        let data = [0b1011_0010, 0b0111_1111];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(3).unwrap(), 0b011);
        // 跨字节读取
        assert_eq!(br.read_bits(6).unwrap(), 0b0010_01);
        assert_eq!(br.read_bits(6).unwrap(), 0b11_1111);
        assert!(br.is_eos());
    }

    #[test]
    fn test_比特读取_32位拼接() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x80];
        let mut br = BitReader::new(&data);
        assert_eq!(br.next_bits(32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(br.next_bits(0).unwrap(), 0);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.position(), 33);
    }

    #[test]
    fn test_比特读取_32位最高位不作符号() {
        let data = [0xFF, 0xFF, 0xFF, 0xFE, 0x80, 0x00, 0x00, 0x01];
        let mut br = BitReader::new(&data);
        assert_eq!(br.next_bits(32).unwrap(), 0xFFFF_FFFE);
        assert_eq!(br.next_bits(32).unwrap(), 0x8000_0001);
        assert!(br.is_eos());
    }

    #[test]
    fn test_比特读取_越界报错() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(5).unwrap(), 0x1F);
        match br.read_bits(4) {
            Err(TheoraError::BitstreamExhausted {
                needed, position, ..
            }) => {
                assert_eq!(needed, 4);
                assert_eq!(position, 5);
            }
            other => panic!("期望比特流耗尽, 实际: {other:?}"),
        }
        // 失败后状态不变
        assert_eq!(br.read_bits(3).unwrap(), 0b111);
    }

    #[test]
    fn test_比特读取_空数据() {
        let mut br = BitReader::new(&[]);
        assert!(br.is_eos());
        assert!(br.read_bits(1).is_err());
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(62), 6);
        assert_eq!(ilog(63), 6);
        assert_eq!(ilog(64), 7);
        assert_eq!(ilog(383), 9);
    }
}

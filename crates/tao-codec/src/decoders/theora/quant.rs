//! 量化参数解析与量化矩阵计算.

use super::bitreader::{BitReader, ilog};
use super::error::{TheoraError, TheoraResult};

/// 基础矩阵上限
const MAX_BASE_MATRICES: usize = 384;

/// 单个 (qti, pli) 组合的量化区间划分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct QuantRanges {
    /// 各区间跨越的 qi 数量, 总和为 63
    pub(crate) sizes: Vec<u32>,
    /// 区间端点对应的基础矩阵下标, 长度为 sizes.len() + 1
    pub(crate) base_indices: Vec<usize>,
}

/// setup 头中的量化参数
#[derive(Debug, Clone)]
pub struct QuantParams {
    pub(crate) ac_scale: [u32; 64],
    pub(crate) dc_scale: [u32; 64],
    pub(crate) base_matrices: Vec<[u8; 64]>,
    /// 下标 [qti][pli]
    pub(crate) ranges: [[QuantRanges; 3]; 2],
}

impl QuantParams {
    pub(crate) fn read(br: &mut BitReader<'_>) -> TheoraResult<Self> {
        let nbits = br.read_bits(4)? + 1;
        let mut ac_scale = [0u32; 64];
        for v in ac_scale.iter_mut() {
            *v = br.next_bits(nbits)?;
        }

        let nbits = br.read_bits(4)? + 1;
        let mut dc_scale = [0u32; 64];
        for v in dc_scale.iter_mut() {
            *v = br.next_bits(nbits)?;
        }

        let nbms = br.next_bits(9)? as usize + 1;
        if nbms > MAX_BASE_MATRICES {
            return Err(TheoraError::UndecodableStream(format!(
                "基础矩阵数量超过 {MAX_BASE_MATRICES}: {nbms}"
            )));
        }
        let mut base_matrices = vec![[0u8; 64]; nbms];
        for bm in base_matrices.iter_mut() {
            for v in bm.iter_mut() {
                *v = br.read_bits(8)? as u8;
            }
        }

        let bmi_bits = ilog(nbms as u32 - 1);
        let mut ranges: [[QuantRanges; 3]; 2] = Default::default();
        for qti in 0..2 {
            for pli in 0..3 {
                let new_ranges = if qti > 0 || pli > 0 {
                    br.read_flag()?
                } else {
                    true
                };

                if !new_ranges {
                    let repeat_previous = qti > 0 && br.read_flag()?;
                    let (qtj, plj) = if repeat_previous {
                        (qti - 1, pli)
                    } else {
                        let flat = 3 * qti + pli - 1;
                        (flat / 3, flat % 3)
                    };
                    ranges[qti][pli] = ranges[qtj][plj].clone();
                    continue;
                }

                let mut sizes = Vec::new();
                let mut base_indices = Vec::new();
                let first = br.next_bits(bmi_bits)? as usize;
                if first >= nbms {
                    return Err(TheoraError::UndecodableStream(format!(
                        "基础矩阵下标越界: {first} >= {nbms}"
                    )));
                }
                base_indices.push(first);

                let mut qi = 0u32;
                while qi < 63 {
                    let size = br.next_bits(ilog(62 - qi))? + 1;
                    qi += size;
                    sizes.push(size);
                    let bmi = br.next_bits(bmi_bits)? as usize;
                    if bmi >= nbms {
                        return Err(TheoraError::UndecodableStream(format!(
                            "基础矩阵下标越界: {bmi} >= {nbms}"
                        )));
                    }
                    base_indices.push(bmi);
                }
                if qi > 63 {
                    return Err(TheoraError::UndecodableStream(format!(
                        "量化区间总长超过 63: {qi}"
                    )));
                }
                ranges[qti][pli] = QuantRanges {
                    sizes,
                    base_indices,
                };
            }
        }

        Ok(Self {
            ac_scale,
            dc_scale,
            base_matrices,
            ranges,
        })
    }

    /// 计算 (qti, pli, qi) 对应的量化矩阵, 自然序
    pub(crate) fn matrix(&self, qti: usize, pli: usize, qi: usize) -> [u16; 64] {
        let ranges = &self.ranges[qti][pli];
        let qi = qi as i64;

        // 找到包含 qi 的区间
        let mut qri = 0usize;
        let mut start = 0i64;
        while qri + 1 < ranges.sizes.len() && qi > start + i64::from(ranges.sizes[qri]) {
            start += i64::from(ranges.sizes[qri]);
            qri += 1;
        }
        let size = i64::from(ranges.sizes[qri]);
        let end = start + size;
        let bm_lo = &self.base_matrices[ranges.base_indices[qri]];
        let bm_hi = &self.base_matrices[ranges.base_indices[qri + 1]];

        let mut out = [0u16; 64];
        for ci in 0..64 {
            let bm = (2 * (end - qi) * i64::from(bm_lo[ci])
                + 2 * (qi - start) * i64::from(bm_hi[ci])
                + size)
                / (2 * size);
            let qmin = match (ci == 0, qti == 0) {
                (true, true) => 16,
                (true, false) => 32,
                (false, true) => 8,
                (false, false) => 16,
            };
            let scale = if ci == 0 {
                self.dc_scale[qi as usize]
            } else {
                self.ac_scale[qi as usize]
            };
            let value = ((i64::from(scale) * bm / 100) * 4).min(4096).max(qmin);
            out[ci] = value as u16;
        }
        out
    }
}

/// 预先计算好的全部量化矩阵, 下标 [qti][pli][qi]
#[derive(Debug, Clone)]
pub(crate) struct QuantMatrices {
    matrices: Vec<[u16; 64]>,
}

impl QuantMatrices {
    pub(crate) fn new(params: &QuantParams) -> Self {
        let mut matrices = Vec::with_capacity(2 * 3 * 64);
        for qti in 0..2 {
            for pli in 0..3 {
                for qi in 0..64 {
                    matrices.push(params.matrix(qti, pli, qi));
                }
            }
        }
        Self { matrices }
    }

    pub(crate) fn get(&self, qti: usize, pli: usize, qi: usize) -> &[u16; 64] {
        &self.matrices[(qti * 3 + pli) * 64 + qi]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::theora::headers::parse_setup_header;
    use crate::decoders::theora::test_util::build_setup_header;
    use tao_core::bitwriter::BitWriter;

    fn flat_params(dc: u32, ac: u32, bm0: u8, bm1: u8) -> QuantParams {
        let range = QuantRanges {
            sizes: vec![63],
            base_indices: vec![0, 1],
        };
        QuantParams {
            ac_scale: [ac; 64],
            dc_scale: [dc; 64],
            base_matrices: vec![[bm0; 64], [bm1; 64]],
            ranges: std::array::from_fn(|_| std::array::from_fn(|_| range.clone())),
        }
    }

    #[test]
    fn test_量化矩阵_区间插值() {
        let params = flat_params(100, 100, 16, 32);
        // qi=0 取第一个矩阵: 100*16/100*4 = 64
        assert_eq!(params.matrix(0, 0, 0)[5], 64);
        // qi=63 取第二个矩阵: 32*4 = 128
        assert_eq!(params.matrix(0, 0, 63)[5], 128);
        // 中间值线性插值并四舍五入
        let mid = params.matrix(0, 0, 31)[5];
        assert!(mid > 64 && mid < 128);
    }

    #[test]
    fn test_量化矩阵_上下限() {
        let params = flat_params(1, 1, 1, 1);
        let intra = params.matrix(0, 0, 10);
        assert_eq!(intra[0], 16);
        assert_eq!(intra[1], 8);
        let inter = params.matrix(1, 2, 10);
        assert_eq!(inter[0], 32);
        assert_eq!(inter[1], 16);

        let params = flat_params(10_000, 10_000, 255, 255);
        assert_eq!(params.matrix(0, 0, 0)[0], 4096);
    }

    /// 逐一检查 2 x 3 x 64 个矩阵的全部系数
    fn assert_matrices_in_range(matrices: &QuantMatrices) {
        for qti in 0..2 {
            for pli in 0..3 {
                for qi in 0..64 {
                    let m = matrices.get(qti, pli, qi);
                    for (ci, &v) in m.iter().enumerate() {
                        let qmin = match (ci == 0, qti == 0) {
                            (true, true) => 16,
                            (true, false) => 32,
                            (false, true) => 8,
                            (false, false) => 16,
                        };
                        assert!(
                            (qmin..=4096).contains(&v),
                            "qti={qti} pli={pli} qi={qi} ci={ci}: {v} 不在 [{qmin}, 4096]"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_量化矩阵_默认setup头全部在范围内() {
        let setup = parse_setup_header(&build_setup_header(0)).unwrap();
        let matrices = QuantMatrices::new(&setup.quant);
        assert_matrices_in_range(&matrices);
        // 平坦量化: 100 * 8 / 100 * 4 = 32
        assert_eq!(matrices.get(1, 2, 63)[17], 32);
    }

    #[test]
    fn test_量化矩阵_极端参数全部在范围内() {
        let mut bw = BitWriter::new();
        // AC 缩放 16 位, 在 65535 与 0 之间交替
        bw.write_bits(15, 4);
        for qi in 0..64 {
            bw.write_bits(if qi % 2 == 0 { 65535 } else { 0 }, 16);
        }
        // DC 缩放 16 位, 随 qi 增长
        bw.write_bits(15, 4);
        for qi in 0..64u32 {
            bw.write_bits(qi * 1000, 16);
        }
        // 3 个基础矩阵: 全 0, 全 255, 255/1 交错
        bw.write_bits(2, 9);
        for m in 0..3 {
            for ci in 0..64 {
                let v = match m {
                    0 => 0,
                    1 => 255,
                    _ if ci % 2 == 0 => 255,
                    _ => 1,
                };
                bw.write_bits(v, 8);
            }
        }
        // 每个 (qti, pli) 都给出新的三段区间 [1, 61, 1]
        for qti in 0..2u32 {
            for pli in 0..3u32 {
                if qti > 0 || pli > 0 {
                    bw.write_bit(1);
                }
                bw.write_bits((qti * 3 + pli) % 3, 2);
                let mut qi = 0;
                for (i, size) in [1u32, 61, 1].into_iter().enumerate() {
                    bw.write_bits(size - 1, ilog(62 - qi));
                    qi += size;
                    bw.write_bits((i as u32 + pli) % 3, 2);
                }
            }
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let params = QuantParams::read(&mut br).unwrap();
        assert_eq!(params.ranges[1][2].sizes, vec![1, 61, 1]);
        assert_eq!(params.ac_scale[0], 65535);

        let matrices = QuantMatrices::new(&params);
        assert_matrices_in_range(&matrices);
        // 缩放为 0 时落到下限, 缩放极大时夹到上限
        assert_eq!(matrices.get(0, 1, 1)[5], 8);
        assert_eq!(matrices.get(1, 0, 0)[0], 32);
        assert!(matrices.get(0, 0, 62).contains(&4096));
    }

    #[test]
    fn test_量化矩阵_多区间查找() {
        let mut params = flat_params(100, 100, 10, 20);
        params.base_matrices.push([40; 64]);
        params.ranges[0][0] = QuantRanges {
            sizes: vec![30, 33],
            base_indices: vec![0, 1, 2],
        };
        // qi=30 处于区间边界, 两个区间结果一致
        assert_eq!(params.matrix(0, 0, 30)[1], 80);
        assert_eq!(params.matrix(0, 0, 63)[1], 160);
    }
}

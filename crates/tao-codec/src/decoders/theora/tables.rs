//! Theora 固定常量表.

/// 之字形扫描序号到自然序系数下标
pub(crate) const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59, 52,
    45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// 超级块内 16 个块的 Hilbert 曲线顺序, (x, y) 以左下角为原点
pub(crate) const HILBERT_ORDER: [(usize, usize); 16] = [
    (0, 0),
    (1, 0),
    (1, 1),
    (0, 1),
    (0, 2),
    (0, 3),
    (1, 3),
    (1, 2),
    (2, 2),
    (2, 3),
    (3, 3),
    (3, 2),
    (3, 1),
    (2, 1),
    (2, 0),
    (3, 0),
];

/// 超级块内 4 个宏块的顺序: 左下, 左上, 右上, 右下
pub(crate) const MACROBLOCK_ORDER: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 1), (1, 0)];

/// 模式方案 1..=6 的序号到模式映射, 下标为方案号 - 1
pub(crate) const MODE_SCHEMES: [[u8; 8]; 6] = [
    [3, 4, 2, 0, 1, 5, 6, 7],
    [3, 4, 0, 2, 1, 5, 6, 7],
    [3, 2, 4, 0, 1, 5, 6, 7],
    [3, 2, 0, 4, 1, 5, 6, 7],
    [0, 3, 4, 2, 1, 5, 6, 7],
    [0, 5, 3, 4, 2, 1, 6, 7],
];

/// DC 预测权重 `[左, 左下, 下, 右下, 除数]`, 下标为可用邻居位掩码
pub(crate) const DC_WEIGHTS: [[i32; 5]; 16] = [
    [0, 0, 0, 0, 0],
    [1, 0, 0, 0, 1],
    [0, 1, 0, 0, 1],
    [1, 0, 0, 0, 1],
    [0, 0, 1, 0, 1],
    [1, 0, 1, 0, 2],
    [0, 0, 1, 0, 1],
    [29, -26, 29, 0, 32],
    [0, 0, 0, 1, 1],
    [75, 0, 0, 53, 128],
    [0, 1, 0, 1, 2],
    [75, 0, 0, 53, 128],
    [0, 0, 1, 0, 1],
    [75, 0, 0, 53, 128],
    [0, 3, 10, 3, 16],
    [29, -26, 29, 0, 32],
];

/// token 17..=22 的幅值基数
pub(crate) const TOKEN_MAGNITUDE_BASE: [i32; 6] = [7, 9, 13, 21, 37, 69];

/// token 17..=22 的幅值附加位数
pub(crate) const TOKEN_MAGNITUDE_BITS: [u32; 6] = [1, 2, 3, 4, 5, 9];

/// 按 token 序号选择 Huffman 码表组
pub(crate) fn huffman_group(ti: usize) -> usize {
    match ti {
        0 => 0,
        1..=5 => 1,
        6..=14 => 2,
        15..=27 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_之字形表为排列() {
        let mut seen = [false; 64];
        for &ci in &ZIGZAG {
            assert!(!seen[ci]);
            seen[ci] = true;
        }
    }

    #[test]
    fn test_hilbert_相邻块互相接邻() {
        for pair in HILBERT_ORDER.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dist = a.0.abs_diff(b.0) + a.1.abs_diff(b.1);
            assert_eq!(dist, 1, "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn test_码表组划分() {
        assert_eq!(huffman_group(0), 0);
        assert_eq!(huffman_group(5), 1);
        assert_eq!(huffman_group(6), 2);
        assert_eq!(huffman_group(27), 3);
        assert_eq!(huffman_group(63), 4);
    }
}

//! 8x8 整数逆 DCT.
//!
//! 先对 8 行做一维变换, 再对 8 列做一维变换, 最后 `(x + 8) >> 4`.
//! 所有中间结果按 16 位截断, 与参考解码器逐位一致.

const C1S7: i32 = 64277;
const C2S6: i32 = 60547;
const C3S5: i32 = 54491;
const C4S4: i32 = 46341;
const C5S3: i32 = 36410;
const C6S2: i32 = 25080;
const C7S1: i32 = 12785;

#[inline]
fn trunc16(v: i32) -> i32 {
    i32::from(v as i16)
}

#[inline]
fn mul(c: i32, x: i32) -> i32 {
    (c * x) >> 16
}

/// 一维 8 点逆变换, 输入输出均视为 16 位有符号数
fn idct_1d(x: [i32; 8]) -> [i32; 8] {
    let mut t = [0i32; 8];
    t[0] = mul(C4S4, trunc16(x[0] + x[4]));
    t[1] = mul(C4S4, trunc16(x[0] - x[4]));
    t[2] = mul(C6S2, x[2]) - mul(C2S6, x[6]);
    t[3] = mul(C2S6, x[2]) + mul(C6S2, x[6]);
    t[4] = mul(C7S1, x[1]) - mul(C1S7, x[7]);
    t[5] = mul(C3S5, x[5]) - mul(C5S3, x[3]);
    t[6] = mul(C5S3, x[5]) + mul(C3S5, x[3]);
    t[7] = mul(C1S7, x[1]) + mul(C7S1, x[7]);

    let r = t[4] + t[5];
    t[5] = mul(C4S4, trunc16(t[4] - t[5]));
    t[4] = r;
    let r = t[7] + t[6];
    t[6] = mul(C4S4, trunc16(t[7] - t[6]));
    t[7] = r;

    let r = t[0] + t[3];
    t[3] = t[0] - t[3];
    t[0] = r;
    let r = t[1] + t[2];
    t[2] = t[1] - t[2];
    t[1] = r;
    let r = t[6] + t[5];
    t[5] = t[6] - t[5];
    t[6] = r;

    [
        trunc16(t[0] + t[7]),
        trunc16(t[1] + t[6]),
        trunc16(t[2] + t[5]),
        trunc16(t[3] + t[4]),
        trunc16(t[3] - t[4]),
        trunc16(t[2] - t[5]),
        trunc16(t[1] - t[6]),
        trunc16(t[0] - t[7]),
    ]
}

/// 对自然序的反量化系数做二维逆变换, 返回 64 个残差 (行优先, 第 0 行为底行)
pub fn idct_8x8(coeffs: &[i16; 64]) -> [i16; 64] {
    let mut tmp = [0i32; 64];
    for row in 0..8 {
        let mut x = [0i32; 8];
        for (c, v) in x.iter_mut().enumerate() {
            *v = i32::from(coeffs[row * 8 + c]);
        }
        let y = idct_1d(x);
        tmp[row * 8..row * 8 + 8].copy_from_slice(&y);
    }

    let mut out = [0i16; 64];
    for col in 0..8 {
        let mut x = [0i32; 8];
        for (r, v) in x.iter_mut().enumerate() {
            *v = tmp[r * 8 + col];
        }
        let y = idct_1d(x);
        for (r, &v) in y.iter().enumerate() {
            out[r * 8 + col] = ((v + 8) >> 4) as i16;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idct_全零输入() {
        assert_eq!(idct_8x8(&[0; 64]), [0; 64]);
    }

    #[test]
    fn test_idct_仅直流为常数() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 256;
        let out = idct_8x8(&coeffs);
        // 256 * C4S4^2 / 2^32 约为 128, 再除以 16 取整为 8
        assert!(out.iter().all(|&v| v == out[0]));
        assert_eq!(out[0], 8);
    }

    #[test]
    fn test_idct_水平交流分量() {
        let mut coeffs = [0i16; 64];
        coeffs[1] = 200;
        let out = idct_8x8(&coeffs);
        // 每一行相同, 左右反对称
        for row in 1..8 {
            assert_eq!(out[row * 8..row * 8 + 8], out[0..8]);
        }
        for c in 0..4 {
            assert_eq!(out[c], -out[7 - c]);
        }
        assert!(out[0] > 0);
    }

    /// 与 `idct_8x8` 同尺度的浮点正变换: 系数 = c(u) c(v) sum s cos cos
    fn forward_dct(src: &[i32; 64]) -> [i16; 64] {
        let pi = std::f64::consts::PI;
        let norm = |k: usize| if k == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
        let mut out = [0i16; 64];
        for v in 0..8 {
            for u in 0..8 {
                let mut acc = 0.0;
                for r in 0..8 {
                    for c in 0..8 {
                        acc += f64::from(src[r * 8 + c])
                            * ((2 * c + 1) as f64 * u as f64 * pi / 16.0).cos()
                            * ((2 * r + 1) as f64 * v as f64 * pi / 16.0).cos();
                    }
                }
                out[v * 8 + u] = (norm(u) * norm(v) * acc).round() as i16;
            }
        }
        out
    }

    fn assert_round_trip(src: &[i32; 64]) {
        let out = idct_8x8(&forward_dct(src));
        for (i, (&got, &want)) in out.iter().zip(src.iter()).enumerate() {
            assert!(
                (i32::from(got) - want).abs() <= 1,
                "位置 {i}: 逆变换 {got}, 原值 {want}"
            );
        }
    }

    #[test]
    fn test_idct_正逆变换往返() {
        assert_round_trip(&std::array::from_fn(|i| i as i32 - 32));
        assert_round_trip(&std::array::from_fn(|i| {
            let (r, c) = ((i / 8) as i32, (i % 8) as i32);
            c * 16 - 56 + r * 3
        }));
        assert_round_trip(&std::array::from_fn(|i| {
            if (i / 8 + i % 8) % 2 == 1 { 100 } else { -100 }
        }));

        // 伪随机残差块, 取值 -128..=127
        let mut seed = 0x1234_5678u32;
        for _ in 0..8 {
            let block: [i32; 64] = std::array::from_fn(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345) & 0x7FFF_FFFF;
                ((seed >> 16) % 256) as i32 - 128
            });
            assert_round_trip(&block);
        }
    }

    #[test]
    fn test_idct_一维变换截断() {
        let y = idct_1d([32767, 0, 0, 0, 32767, 0, 0, 0]);
        // x0 + x4 超出 16 位后被截断为负数
        assert!(y[0] < 0);
    }
}

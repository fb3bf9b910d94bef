//! 有理数类型, 用于时间基 (time_base), 帧率与宽高比.
//!
//! 对标 FFmpeg 的 `AVRational`.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 例如: 帧率 30000/1001 表示 29.97fps, 对应时间基 1001/30000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 由无符号 32 位分子分母构造并约分
    ///
    /// 码流中的字段可能超出 i32, 此时分子分母同时右移直到放得下.
    pub fn from_u32(mut num: u32, mut den: u32) -> Self {
        while num > i32::MAX as u32 || den > i32::MAX as u32 {
            num >>= 1;
            den >>= 1;
        }
        Self::new(num as i32, den.max(1) as i32).reduce()
    }

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64, 分母为 0 时返回 `f64::NAN`
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 约分, 并保证分母为正
    pub fn reduce(self) -> Self {
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if self.den == 0 || g == 0 {
            return self;
        }
        let g = g as i32;
        let sign = self.den.signum();
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }

    /// 求倒数
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

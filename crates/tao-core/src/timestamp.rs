//! 时间戳常量.
//!
//! 时间戳为整数值, 由所属流的 `time_base` 换算为秒.

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

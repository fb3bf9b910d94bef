//! 色彩相关类型定义.

mod color_range;
mod color_space;

pub use color_range::ColorRange;
pub use color_space::ColorSpace;

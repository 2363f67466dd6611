//! 谱面模块
//!
//! - `pattern`：练习谱面的解析、校验与时刻换算

pub mod pattern;

//! Drum Coach：打击乐练习的计时与判定引擎
//!
//! - `chart`：谱面解析与时刻换算
//! - `clock`：单调时钟与演奏原点
//! - `loops`：任务队列、前瞻调度、音频设备接口与每帧绘制
//! - `judge` / `flash`：击打判定与闪光反馈
//! - `session`：独占上述状态的练习会话

pub mod chart;
pub mod clock;
pub mod config;
pub mod error;
pub mod flash;
pub mod judge;
pub mod logging;
pub mod loops;
pub mod session;

pub use chart::pattern::{Lane, Pattern, PatternEvent, PatternSpec};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{CoachError, DeviceError};
pub use judge::{JudgeResult, JudgeWindows, Verdict};
pub use session::{Feedback, Session};

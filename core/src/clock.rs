//! 演奏时钟
//!
//! 所有组件只通过 [`Clock`] 读取时间，测试中可注入 [`ManualClock`]。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gametime::{TimeSpan, TimeStamp};

use crate::error::CoachError;

/// 单调时钟：返回自任意固定起点以来的秒数
pub trait Clock: Send + Sync {
    /// 当前时刻（秒）
    fn now(&self) -> f64;
}

/// 基于 `gametime` 的单调时钟
pub struct MonotonicClock {
    /// 时钟起点
    epoch: TimeStamp,
}

impl MonotonicClock {
    /// 以当前时刻为起点创建时钟
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: TimeStamp::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        let span = TimeStamp::now()
            .checked_elapsed_since(self.epoch)
            .unwrap_or(TimeSpan::ZERO);
        span.as_nanos().max(0) as f64 / 1_000_000_000.0
    }
}

/// 手动推进的时钟
#[derive(Default)]
pub struct ManualClock {
    /// 当前秒数（`f64` 位模式）
    bits: AtomicU64,
}

impl ManualClock {
    /// 创建读数为 0 的时钟
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置读数
    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    /// 推进读数
    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// 以演奏开始时刻为原点的时钟
pub struct PlaybackClock {
    /// 底层时钟
    clock: Arc<dyn Clock>,
    /// 演奏开始时的时钟读数
    origin: Option<f64>,
}

impl PlaybackClock {
    /// 包装底层时钟
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            origin: None,
        }
    }

    /// 记录当前时刻为原点
    ///
    /// # Errors
    ///
    /// - 未经 `stop` 再次开始
    pub fn start(&mut self) -> Result<f64, CoachError> {
        if self.origin.is_some() {
            return Err(CoachError::AlreadyRunning);
        }
        let origin = self.clock.now();
        self.origin = Some(origin);
        Ok(origin)
    }

    /// 清除原点
    pub fn stop(&mut self) {
        self.origin = None;
    }

    /// 底层时钟当前读数
    #[must_use]
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// 自演奏开始经过的秒数；未开始时返回 `None`
    #[must_use]
    pub fn elapsed(&self) -> Option<f64> {
        self.elapsed_at(self.clock.now())
    }

    /// 将时钟读数换算为演奏内时刻
    #[must_use]
    pub fn elapsed_at(&self, instant: f64) -> Option<f64> {
        self.origin.map(|origin| (instant - origin).max(0.0))
    }

    /// 演奏原点
    #[must_use]
    pub const fn origin(&self) -> Option<f64> {
        self.origin
    }

    /// 是否正在演奏
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.origin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_follows_origin() {
        let manual = Arc::new(ManualClock::new());
        manual.set(10.0);
        let mut clock = PlaybackClock::new(manual.clone());
        assert_eq!(clock.elapsed(), None);

        assert_eq!(clock.start(), Ok(10.0));
        manual.advance(1.25);
        assert_eq!(clock.elapsed(), Some(1.25));
        // 早于原点的读数截断为 0
        assert_eq!(clock.elapsed_at(9.0), Some(0.0));
    }

    #[test]
    fn start_twice_is_refused() {
        let mut clock = PlaybackClock::new(Arc::new(ManualClock::new()));
        clock.start().unwrap();
        assert_eq!(clock.start(), Err(CoachError::AlreadyRunning));
        assert!(clock.is_running());

        clock.stop();
        assert!(!clock.is_running());
        assert!(clock.start().is_ok());
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}

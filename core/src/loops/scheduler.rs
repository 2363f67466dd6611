//! 节拍器与伴奏的前瞻调度
//!
//! 控制定时器以粗粒度周期投递 [`Task::SchedulerTick`]；每个节拍中调度器把
//! `[高水位, elapsed + horizon)` 内尚未提交的事件一次性交给设备的定时触发接口，
//! 实际发声时刻由设备保证。节拍时刻由锚点推算，不随定时器抖动累积误差。

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::{Scheduler, StopPolicy};
use crate::error::CoachError;
use crate::loops::Task;
use crate::loops::audio::{AudioDevice, Clip, TriggerId};

/// 由速度计算每拍秒数
///
/// # Errors
///
/// - `bpm` 为 0
pub fn beat_seconds(bpm: u32) -> Result<f64, CoachError> {
    if bpm == 0 {
        return Err(CoachError::InvalidTempo(bpm));
    }
    Ok(60.0 / f64::from(bpm))
}

/// 前瞻调度器
///
/// 所有时刻均为演奏内时刻（秒）；提交给设备时加上演奏原点换算为设备时刻。
#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    /// 前瞻范围（秒）
    horizon: f64,
    /// 每小节拍数
    beats_per_bar: u64,
    /// 停止时的处理方式
    on_stop: StopPolicy,
    /// 每拍秒数
    beat_seconds: f64,
    /// 锚点拍号
    anchor_beat: u64,
    /// 锚点拍的时刻
    anchor_at: f64,
    /// 下一个尚未提交的拍号
    next_beat: u64,
    /// 伴奏开始时刻
    backing_at: Option<f64>,
    /// 伴奏是否已提交
    backing_submitted: bool,
    /// 已覆盖的前瞻终点，只增不减
    high_water: f64,
    /// 已提交且可能尚未发声的触发
    in_flight: Vec<(TriggerId, f64)>,
}

impl LookaheadScheduler {
    /// 创建调度器
    ///
    /// # Errors
    ///
    /// - `bpm` 为 0
    pub fn new(params: &Scheduler, bpm: u32, backing_at: Option<f64>) -> Result<Self, CoachError> {
        Ok(Self {
            horizon: params.horizon,
            beats_per_bar: u64::from(params.beats_per_bar.max(1)),
            on_stop: params.on_stop,
            beat_seconds: beat_seconds(bpm)?,
            anchor_beat: 0,
            anchor_at: 0.0,
            next_beat: 0,
            backing_at,
            backing_submitted: false,
            high_water: 0.0,
            in_flight: Vec::new(),
        })
    }

    /// 第 `n` 拍的演奏内时刻
    fn beat_time(&self, n: u64) -> f64 {
        let offset = n.saturating_sub(self.anchor_beat) as f64;
        self.anchor_at + offset * self.beat_seconds
    }

    /// 第 `n` 拍使用的音色
    const fn beat_clip(&self, n: u64) -> Clip {
        if n % self.beats_per_bar == 0 {
            Clip::ClickHead
        } else {
            Clip::Click
        }
    }

    /// 执行一次前瞻提交，返回成功提交的触发数
    ///
    /// - `elapsed`：当前演奏内时刻
    /// - `origin`：演奏原点对应的设备时刻
    ///
    /// 设备拒绝的触发记录后跳过，同批其余触发照常提交。
    pub fn tick(&mut self, elapsed: f64, origin: f64, device: &mut dyn AudioDevice) -> usize {
        self.in_flight.retain(|(_, at)| *at >= elapsed);

        let window_end = elapsed + self.horizon;
        let mut batch: Vec<(f64, Clip)> = Vec::new();
        while self.beat_time(self.next_beat) < window_end {
            batch.push((self.beat_time(self.next_beat), self.beat_clip(self.next_beat)));
            self.next_beat = self.next_beat.saturating_add(1);
        }
        if let Some(at) = self.backing_at
            && !self.backing_submitted
            && at < window_end
        {
            batch.push((at, Clip::Backing));
            self.backing_submitted = true;
        }
        batch.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut submitted = 0;
        for (at, clip) in batch {
            match device.start_at(clip, origin + at) {
                Ok(id) => {
                    self.in_flight.push((id, at));
                    submitted += 1;
                    trace!(%clip, at, "已提交");
                }
                Err(e) => warn!(%clip, at, error = %e, "设备拒绝触发，已跳过"),
            }
        }
        self.high_water = self.high_water.max(window_end);
        if submitted > 0 {
            debug!(submitted, elapsed, high_water = self.high_water, "前瞻提交");
        }
        submitted
    }

    /// 修改速度：已提交的拍保持不变，之后的拍按新间隔排布
    ///
    /// # Errors
    ///
    /// - `bpm` 为 0
    pub fn set_bpm(&mut self, bpm: u32) -> Result<(), CoachError> {
        let beat = beat_seconds(bpm)?;
        if self.next_beat > 0 {
            let last = self.beat_time(self.next_beat - 1);
            self.anchor_beat = self.next_beat;
            self.anchor_at = last + beat;
        }
        self.beat_seconds = beat;
        Ok(())
    }

    /// 停止调度
    ///
    /// 清空高水位与待提交状态；按 [`StopPolicy`] 决定是否取消已提交的触发。
    /// 返回被取消的触发数。
    pub fn stop(&mut self, device: &mut dyn AudioDevice) -> usize {
        let mut cancelled = 0;
        if self.on_stop == StopPolicy::Cancel {
            for (id, _) in self.in_flight.drain(..) {
                device.cancel(id);
                cancelled += 1;
            }
        }
        self.in_flight.clear();
        self.next_beat = 0;
        self.anchor_beat = 0;
        self.anchor_at = 0.0;
        self.backing_submitted = false;
        self.high_water = 0.0;
        debug!(cancelled, policy = ?self.on_stop, "调度器已停止");
        cancelled
    }

    /// 已覆盖的前瞻终点
    #[must_use]
    pub const fn high_water(&self) -> f64 {
        self.high_water
    }

    /// 已提交且可能尚未发声的触发数
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// 控制定时器
///
/// 在独立线程中按固定周期向任务队列投递带会话代号的节拍。
/// 取消时关闭通知通道并等待线程退出；丢弃时自动取消。
pub struct ControlTimer {
    /// 会话代号
    generation: u64,
    /// 取消通知发送端，丢弃即通知线程退出
    cancel_tx: Option<mpsc::Sender<()>>,
    /// 定时线程句柄
    handle: Option<JoinHandle<()>>,
}

impl ControlTimer {
    /// 启动定时线程
    #[must_use]
    pub fn spawn(period: Duration, tasks: mpsc::Sender<Task>, generation: u64) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let mut next_tick = Instant::now();
            loop {
                next_tick = next_tick.checked_add(period).unwrap_or_else(Instant::now);
                let wait = next_tick.saturating_duration_since(Instant::now());
                match cancel_rx.recv_timeout(wait) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if tasks.send(Task::SchedulerTick { generation }).is_err() {
                            break;
                        }
                    }
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            trace!(generation, "控制定时器线程退出");
        });
        Self {
            generation,
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// 会话代号
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// 取消定时器并等待线程退出
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(generation = self.generation, "控制定时器线程异常退出");
        }
    }
}

impl Drop for ControlTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

//! 练习会话
//!
//! `Session` 独占演奏状态：谱面、时钟原点、前瞻调度器、闪光状态与音频设备。
//! 所有操作都以 `&mut self` 执行，由主循环串行调用。

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chart::pattern::{Lane, Pattern, PatternSpec};
use crate::clock::{Clock, PlaybackClock};
use crate::config::{Render, Scheduler, Sys};
use crate::error::CoachError;
use crate::flash::FlashState;
use crate::judge::{JudgeEngine, Verdict};
use crate::loops::audio::AudioDevice;
use crate::loops::scheduler::{LookaheadScheduler, beat_seconds};
use crate::loops::visual::{
    LanePositions, Palette, PositionLookup, RenderSink, flash_rings, instruction_rings,
    target_rings,
};

/// 向观察者发送的反馈
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// 判定结论
    Verdict(Verdict),
    /// 被丢弃的击打或谱面事件
    Dropped(CoachError),
}

/// 练习会话
pub struct Session {
    /// 演奏时钟
    clock: PlaybackClock,
    /// 判定引擎
    engine: JudgeEngine,
    /// 闪光状态
    flash: FlashState,
    /// 当前谱面
    pattern: Option<Pattern>,
    /// 当前速度
    bpm: u32,
    /// 设备延迟补偿（秒）
    hit_offset: f64,
    /// 调度配置
    scheduler_params: Scheduler,
    /// 绘制配置
    render: Render,
    /// 演奏中的前瞻调度器
    scheduler: Option<LookaheadScheduler>,
    /// 音频设备
    device: Box<dyn AudioDevice>,
    /// 轨道位置表
    positions: Box<dyn PositionLookup + Send>,
    /// 轨道颜色
    palette: Palette,
    /// 会话代号，每次开始演奏递增
    generation: u64,
    /// 反馈发送端
    feedback: Option<Sender<Feedback>>,
}

impl Session {
    /// 以系统配置创建会话，位置表取自配置中的轨道
    ///
    /// # Errors
    ///
    /// - 配置的速度为 0
    pub fn new(
        sys: &Sys,
        clock: Arc<dyn Clock>,
        device: Box<dyn AudioDevice>,
    ) -> Result<Self, CoachError> {
        beat_seconds(sys.tempo.bpm)?;
        Ok(Self {
            clock: PlaybackClock::new(clock),
            engine: JudgeEngine::new(sys.judge.windows()),
            flash: FlashState::new(sys.flash.clone()),
            pattern: None,
            bpm: sys.tempo.bpm,
            hit_offset: sys.judge.hit_offset,
            scheduler_params: sys.scheduler.clone(),
            render: sys.render.clone(),
            scheduler: None,
            device,
            positions: Box::new(LanePositions::from_lanes(&sys.lanes)),
            palette: Palette::from_lanes(&sys.lanes),
            generation: 0,
            feedback: None,
        })
    }

    /// 替换位置表
    #[must_use]
    pub fn with_positions(mut self, positions: Box<dyn PositionLookup + Send>) -> Self {
        self.positions = positions;
        self
    }

    /// 设置反馈发送端
    #[must_use]
    pub fn with_feedback(mut self, feedback: Sender<Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// 载入谱面并按当前速度换算时刻
    ///
    /// 演奏中载入会先停止演奏；失败时保留原谱面。
    ///
    /// # Errors
    ///
    /// - 谱面格式错误
    pub fn load(&mut self, spec: PatternSpec) -> Result<(), CoachError> {
        let mut pattern = Pattern::load(spec)?;
        pattern.retime(self.bpm)?;
        if self.is_running() {
            self.stop();
        }
        info!(
            events = pattern.len(),
            subdivision = pattern.subdivision(),
            step_seconds = pattern.step_seconds(),
            "谱面已载入"
        );
        self.pattern = Some(pattern);
        Ok(())
    }

    /// 开始演奏，返回本次会话代号
    ///
    /// 重置全部消费标记与闪光，并立即执行一次前瞻提交。
    ///
    /// # Errors
    ///
    /// - 尚未载入谱面
    /// - 谱面为空
    /// - 已在演奏中
    pub fn start(&mut self) -> Result<u64, CoachError> {
        let pattern = self.pattern.as_mut().ok_or(CoachError::NoPattern)?;
        if pattern.is_empty() {
            return Err(CoachError::EmptyPattern);
        }
        if self.clock.is_running() {
            return Err(CoachError::AlreadyRunning);
        }
        let scheduler = LookaheadScheduler::new(
            &self.scheduler_params,
            self.bpm,
            pattern.bgm_start_offset(),
        )?;
        pattern.reset_consumed();
        self.flash.clear();

        let unknown: Vec<Lane> = pattern
            .lanes()
            .into_iter()
            .filter(|lane| self.positions.position(lane).is_none())
            .cloned()
            .collect();
        for lane in unknown {
            warn!(%lane, "谱面轨道不在位置表中，相关事件将无法绘制");
            self.send_feedback(Feedback::Dropped(CoachError::UnknownLane(lane)));
        }

        let origin = self.clock.start()?;
        self.generation = self.generation.saturating_add(1);
        self.scheduler = Some(scheduler);
        info!(generation = self.generation, origin, bpm = self.bpm, "开始演奏");
        self.scheduler_tick(self.generation);
        Ok(self.generation)
    }

    /// 停止演奏
    ///
    /// 清除时钟原点与调度器；已提交的设备触发按停止策略处理。未在演奏时无操作。
    pub fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop(self.device.as_mut());
        }
        if self.clock.is_running() {
            info!(generation = self.generation, "停止演奏");
        }
        self.clock.stop();
    }

    /// 修改速度：重新换算谱面时刻，演奏中同时调整尚未提交的节拍
    ///
    /// # Errors
    ///
    /// - `bpm` 为 0
    pub fn retime(&mut self, bpm: u32) -> Result<(), CoachError> {
        beat_seconds(bpm)?;
        if let Some(pattern) = self.pattern.as_mut() {
            pattern.retime(bpm)?;
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_bpm(bpm)?;
        }
        self.bpm = bpm;
        info!(bpm, "速度已修改");
        Ok(())
    }

    /// 对已完成延迟补偿的演奏内时刻做出判定
    ///
    /// 未在演奏或没有候选事件时返回 `None`。
    pub fn judge(&mut self, lane: &Lane, hit_time: f64) -> Option<Verdict> {
        if !self.clock.is_running() {
            return None;
        }
        let pattern = self.pattern.as_mut()?;
        let Some(verdict) = self.engine.judge(pattern, lane, hit_time) else {
            debug!(%lane, hit_time, "无判定");
            return None;
        };
        self.flash.trigger(lane, verdict.result, self.clock.now());
        info!(
            %lane,
            result = %verdict.result,
            diff_ms = verdict.diff * 1000.0,
            step = verdict.event.step,
            "判定"
        );
        self.send_feedback(Feedback::Verdict(verdict.clone()));
        Some(verdict)
    }

    /// 击打入口：`arrival` 为时钟读数，补偿设备延迟后交给判定
    ///
    /// 未运行时直接忽略；不在位置表中的轨道被丢弃并通过反馈上报。
    pub fn strike(&mut self, lane: &Lane, arrival: f64) -> Option<Verdict> {
        let elapsed = self.clock.elapsed_at(arrival)?;
        if self.positions.position(lane).is_none() {
            warn!(%lane, "击打轨道不在位置表中，已丢弃");
            self.send_feedback(Feedback::Dropped(CoachError::UnknownLane(lane.clone())));
            return None;
        }
        self.judge(lane, elapsed + self.hit_offset)
    }

    /// 处理控制定时器节拍，过期会话的节拍被忽略
    ///
    /// 返回本次提交的触发数。
    pub fn scheduler_tick(&mut self, generation: u64) -> usize {
        if generation != self.generation {
            debug!(generation, current = self.generation, "忽略过期节拍");
            return 0;
        }
        let (Some(scheduler), Some(origin), Some(elapsed)) = (
            self.scheduler.as_mut(),
            self.clock.origin(),
            self.clock.elapsed(),
        ) else {
            return 0;
        };
        scheduler.tick(elapsed, origin, self.device.as_mut())
    }

    /// 绘制一帧：目标环、指示环与闪光环
    pub fn render(&mut self, sink: &mut dyn RenderSink) {
        let mut rings = target_rings(self.positions.as_ref(), &self.palette, &self.render);
        if let (Some(pattern), Some(elapsed)) = (self.pattern.as_ref(), self.clock.elapsed()) {
            rings.extend(instruction_rings(
                self.positions.as_ref(),
                &self.palette,
                &self.render,
                pattern,
                elapsed,
            ));
        }
        let flashes = self.flash.active_rings(self.clock.now());
        rings.extend(flash_rings(self.positions.as_ref(), &flashes));
        for ring in &rings {
            ring.draw(sink);
        }
    }

    /// 是否正在演奏
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// 当前谱面
    #[must_use]
    pub const fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    /// 当前速度
    #[must_use]
    pub const fn bpm(&self) -> u32 {
        self.bpm
    }

    /// 当前会话代号
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// 自演奏开始经过的秒数
    #[must_use]
    pub fn elapsed(&self) -> Option<f64> {
        self.clock.elapsed()
    }

    /// 控制定时器周期
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        self.scheduler_params.period
    }

    /// 闪光状态
    #[must_use]
    pub const fn flash(&self) -> &FlashState {
        &self.flash
    }

    fn send_feedback(&self, feedback: Feedback) {
        if let Some(tx) = &self.feedback {
            let _ = tx.send(feedback);
        }
    }
}

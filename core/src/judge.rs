//! 击打判定
//!
//! 判定流程：
//! 1. 收集同轨道、未消费且在 GOOD 半宽内的候选事件；
//! 2. 若有刚刚过去（不超过过去优先范围）的事件，取其中最晚的一个；
//! 3. 否则取最早的未来事件（提前击打归于即将到来的音符）；
//! 4. 都没有时取最近的过去事件；
//! 5. 按 PERFECT 半宽分档并将事件标记为已消费。

use std::cmp::Ordering;
use std::fmt;

use crate::chart::pattern::{Lane, Pattern, PatternEvent};

/// 判定窗口（秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgeWindows {
    /// GOOD 半宽
    pub judge: f64,
    /// PERFECT 半宽
    pub perfect: f64,
    /// 过去事件优先范围
    pub close: f64,
}

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JudgeResult {
    /// 完美
    Perfect,
    /// 良好
    Good,
}

impl fmt::Display for JudgeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Perfect => f.write_str("PERFECT"),
            Self::Good => f.write_str("GOOD"),
        }
    }
}

/// 一次判定的结论
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// 被消费事件在谱面中的索引
    pub index: usize,
    /// 被消费事件（消费后的快照）
    pub event: PatternEvent,
    /// 判定结果
    pub result: JudgeResult,
    /// `hitTime - event.time`：正数表示偏晚，负数表示偏早
    pub diff: f64,
}

/// 判定引擎
#[derive(Debug, Clone)]
pub struct JudgeEngine {
    /// 判定窗口
    windows: JudgeWindows,
}

impl JudgeEngine {
    /// 以给定窗口创建引擎
    #[must_use]
    pub const fn new(windows: JudgeWindows) -> Self {
        Self { windows }
    }

    /// 当前判定窗口
    #[must_use]
    pub const fn windows(&self) -> JudgeWindows {
        self.windows
    }

    /// 对一次击打做出判定
    ///
    /// `hit_time` 为已完成延迟补偿的演奏内时刻。无候选事件时返回 `None` 且不修改谱面。
    pub fn judge(&self, pattern: &mut Pattern, lane: &Lane, hit_time: f64) -> Option<Verdict> {
        let candidates = pattern.events_near(hit_time, lane, self.windows.judge);
        let index = self.pick(pattern, &candidates, hit_time)?;
        let event = pattern.consume(index)?.clone();
        let diff = hit_time - event.time;
        Some(Verdict {
            index,
            result: self.classify(diff),
            event,
            diff,
        })
    }

    /// 按偏差分档
    #[must_use]
    pub fn classify(&self, diff: f64) -> JudgeResult {
        if diff.abs() <= self.windows.perfect {
            JudgeResult::Perfect
        } else {
            JudgeResult::Good
        }
    }

    /// 在候选事件中选出判定目标
    fn pick(&self, pattern: &Pattern, candidates: &[usize], hit_time: f64) -> Option<usize> {
        let timed: Vec<(usize, f64)> = candidates
            .iter()
            .filter_map(|idx| pattern.event(*idx).map(|ev| (*idx, ev.time)))
            .collect();

        let close_past = timed
            .iter()
            .filter(|(_, t)| *t <= hit_time && hit_time - *t <= self.windows.close)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((idx, _)) = close_past {
            return Some(*idx);
        }

        let earliest_future = timed
            .iter()
            .filter(|(_, t)| *t >= hit_time)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((idx, _)) = earliest_future {
            return Some(*idx);
        }

        timed
            .iter()
            .min_by(|a, b| {
                let da = (a.1 - hit_time).abs();
                let db = (b.1 - hit_time).abs();
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
            .map(|(idx, _)| *idx)
    }
}

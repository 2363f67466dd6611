//! 闪光反馈状态
//!
//! 判定结论触发对应轨道的闪光；每帧按时间采样透明度，本身不持有任何定时器。

use std::collections::BTreeMap;

use crate::chart::pattern::Lane;
use crate::config::{Flash, FlashStyle};
use crate::judge::JudgeResult;
use crate::loops::visual::Color;

/// 单轨道闪光状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneFlash {
    /// 是否仍在闪光
    pub flashing: bool,
    /// 闪光结束时刻（时钟读数，秒）
    pub end: f64,
    /// 闪光总时长（秒）
    pub duration: f64,
    /// 圆环半径
    pub radius: f32,
    /// 圆环线宽
    pub width: f32,
    /// 颜色
    pub color: Color,
}

/// 某一帧采样得到的闪光圆环
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashRing {
    /// 透明度 [0, 1]
    pub alpha: f32,
    /// 圆环半径
    pub radius: f32,
    /// 圆环线宽
    pub width: f32,
    /// 颜色
    pub color: Color,
}

/// 全部轨道的闪光状态
#[derive(Debug, Clone)]
pub struct FlashState {
    /// 两档闪光样式
    params: Flash,
    /// 轨道到闪光状态
    lanes: BTreeMap<Lane, LaneFlash>,
}

impl FlashState {
    /// 以给定样式创建
    #[must_use]
    pub const fn new(params: Flash) -> Self {
        Self {
            params,
            lanes: BTreeMap::new(),
        }
    }

    /// 判定结果对应的样式
    const fn style(&self, result: JudgeResult) -> &FlashStyle {
        match result {
            JudgeResult::Perfect => &self.params.perfect,
            JudgeResult::Good => &self.params.good,
        }
    }

    /// 触发某轨道的闪光，覆盖该轨道尚未结束的闪光
    pub fn trigger(&mut self, lane: &Lane, result: JudgeResult, now: f64) {
        let style = *self.style(result);
        self.lanes.insert(
            lane.clone(),
            LaneFlash {
                flashing: true,
                end: now + style.duration,
                duration: style.duration,
                radius: style.radius,
                width: style.width,
                color: style.color,
            },
        );
    }

    /// 采样某轨道在 `now` 时的透明度，过期时熄灭并返回 0
    pub fn sample(&mut self, lane: &Lane, now: f64) -> f32 {
        self.lanes
            .get_mut(lane)
            .map_or(0.0, |state| Self::sample_state(state, now))
    }

    /// 采样全部仍在闪光的轨道
    pub fn active_rings(&mut self, now: f64) -> Vec<(Lane, FlashRing)> {
        let mut rings = Vec::new();
        for (lane, state) in &mut self.lanes {
            let alpha = Self::sample_state(state, now);
            if alpha > 0.0 {
                rings.push((
                    lane.clone(),
                    FlashRing {
                        alpha,
                        radius: state.radius,
                        width: state.width,
                        color: state.color,
                    },
                ));
            }
        }
        rings
    }

    /// 某轨道的闪光状态
    #[must_use]
    pub fn lane(&self, lane: &Lane) -> Option<&LaneFlash> {
        self.lanes.get(lane)
    }

    /// 熄灭全部闪光
    pub fn clear(&mut self) {
        self.lanes.clear();
    }

    fn sample_state(state: &mut LaneFlash, now: f64) -> f32 {
        if !state.flashing {
            return 0.0;
        }
        if now >= state.end || state.duration <= 0.0 {
            state.flashing = false;
            return 0.0;
        }
        (((state.end - now) / state.duration) as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_decays_strictly_then_expires() {
        let mut flash = FlashState::new(Flash::default());
        let lane = Lane::from("snare");
        flash.trigger(&lane, JudgeResult::Perfect, 2.0);

        let mut last = f32::INFINITY;
        for i in 1..40 {
            let t = 2.0 + f64::from(i) * 0.01;
            let alpha = flash.sample(&lane, t);
            assert!(alpha < last, "t={t} alpha={alpha} last={last}");
            assert!(alpha > 0.0);
            last = alpha;
        }
        assert_eq!(flash.sample(&lane, 2.4), 0.0);
        assert!(!flash.lane(&lane).unwrap().flashing);
        assert_eq!(flash.sample(&lane, 2.1), 0.0);
    }

    #[test]
    fn perfect_flash_is_longer_and_larger() {
        let mut flash = FlashState::new(Flash::default());
        let kick = Lane::from("kick");
        let snare = Lane::from("snare");
        flash.trigger(&kick, JudgeResult::Perfect, 0.0);
        flash.trigger(&snare, JudgeResult::Good, 0.0);
        let kick_state = *flash.lane(&kick).unwrap();
        let snare_state = *flash.lane(&snare).unwrap();
        assert!(kick_state.end > snare_state.end);
        assert!(kick_state.radius > snare_state.radius);

        // GOOD 已结束，PERFECT 仍在闪光
        let rings = flash.active_rings(0.2);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings.first().map(|(lane, _)| lane), Some(&kick));
    }

    #[test]
    fn untouched_lane_samples_zero() {
        let mut flash = FlashState::new(Flash::default());
        assert_eq!(flash.sample(&Lane::from("hihat"), 1.0), 0.0);
    }
}

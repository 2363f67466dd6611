//! 视觉输出：位置表、绘制接口与每帧圆环构建
//!
//! 投影与相机几何不在本模块处理，位置表只把轨道映射为一个不透明的坐标点。
//! 每帧先构建圆环列表，再逐个交给绘制接口。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chart::pattern::{Lane, Pattern};
use crate::config::{LaneConfig, Render};
use crate::flash::FlashRing;

/// 三维坐标点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// x
    pub x: f32,
    /// y
    pub y: f32,
    /// z
    pub z: f32,
}

impl Point3 {
    /// 创建坐标点
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [f32; 4]);

/// 轨道位置查询
pub trait PositionLookup {
    /// 查询轨道的绘制位置
    fn position(&self, lane: &Lane) -> Option<Point3>;
    /// 全部有位置的轨道
    fn lanes(&self) -> Vec<Lane>;
}

/// 绘制接口
pub trait RenderSink {
    /// 在 `at` 处绘制圆环
    fn draw_ring(
        &mut self,
        at: Point3,
        inner_radius: f32,
        outer_radius: f32,
        color: Color,
        alpha: f32,
    );
}

/// 由配置构建的静态位置表
#[derive(Debug, Clone, Default)]
pub struct LanePositions {
    /// 轨道到位置
    map: BTreeMap<Lane, Point3>,
}

impl LanePositions {
    /// 从轨道配置构建，没有位置的轨道不进入表中
    #[must_use]
    pub fn from_lanes(lanes: &[LaneConfig]) -> Self {
        let map = lanes
            .iter()
            .filter_map(|lane| lane.position.map(|pos| (lane.id.clone(), pos)))
            .collect();
        Self { map }
    }

    /// 插入或覆盖轨道位置
    pub fn insert(&mut self, lane: Lane, at: Point3) {
        self.map.insert(lane, at);
    }
}

impl PositionLookup for LanePositions {
    fn position(&self, lane: &Lane) -> Option<Point3> {
        self.map.get(lane).copied()
    }

    fn lanes(&self) -> Vec<Lane> {
        self.map.keys().cloned().collect()
    }
}

/// 轨道颜色表
#[derive(Debug, Clone, Default)]
pub struct Palette {
    /// 轨道到颜色
    colors: BTreeMap<Lane, Color>,
}

impl Palette {
    /// 从轨道配置构建
    #[must_use]
    pub fn from_lanes(lanes: &[LaneConfig]) -> Self {
        let colors = lanes
            .iter()
            .map(|lane| (lane.id.clone(), lane.color))
            .collect();
        Self { colors }
    }

    /// 轨道颜色，未配置时为白色
    #[must_use]
    pub fn color(&self, lane: &Lane) -> Color {
        self.colors
            .get(lane)
            .copied()
            .unwrap_or(Color([1.0, 1.0, 1.0, 1.0]))
    }
}

/// 单个待绘制圆环
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ring {
    /// 圆心
    pub at: Point3,
    /// 内半径
    pub inner_radius: f32,
    /// 外半径
    pub outer_radius: f32,
    /// 颜色
    pub color: Color,
    /// 透明度
    pub alpha: f32,
}

impl Ring {
    /// 以中线半径与线宽描述圆环
    #[must_use]
    pub fn stroked(at: Point3, radius: f32, width: f32, color: Color, alpha: f32) -> Self {
        Self {
            at,
            inner_radius: (radius - width / 2.0).max(0.0),
            outer_radius: radius + width / 2.0,
            color,
            alpha,
        }
    }

    /// 交给绘制接口
    pub fn draw(&self, sink: &mut dyn RenderSink) {
        sink.draw_ring(
            self.at,
            self.inner_radius,
            self.outer_radius,
            self.color,
            self.alpha,
        );
    }
}

/// 每个有位置的轨道各一个固定目标环
#[must_use]
pub fn target_rings(
    positions: &dyn PositionLookup,
    palette: &Palette,
    render: &Render,
) -> Vec<Ring> {
    positions
        .lanes()
        .iter()
        .filter_map(|lane| {
            let at = positions.position(lane)?;
            Some(Ring::stroked(
                at,
                render.target_radius,
                render.target_width,
                palette.color(lane),
                render.target_alpha,
            ))
        })
        .collect()
}

/// 即将到来的事件的指示环：在目标时刻前 `appear_offset` 秒出现并逐渐收缩
#[must_use]
pub fn instruction_rings(
    positions: &dyn PositionLookup,
    palette: &Palette,
    render: &Render,
    pattern: &Pattern,
    elapsed: f64,
) -> Vec<Ring> {
    if render.appear_offset <= 0.0 {
        return Vec::new();
    }
    let mut rings = Vec::new();
    for event in pattern.events() {
        let appear = event.time - render.appear_offset;
        if elapsed < appear || elapsed > event.time {
            continue;
        }
        let Some(at) = positions.position(&event.note) else {
            continue;
        };
        let t = ((elapsed - appear) / render.appear_offset).clamp(0.0, 1.0) as f32;
        let span = render.instruction_max_radius - render.instruction_min_radius;
        let radius = render.instruction_max_radius - span * t;
        rings.push(Ring::stroked(
            at,
            radius,
            render.instruction_width,
            palette.color(&event.note),
            1.0 - t * 0.5,
        ));
    }
    rings
}

/// 闪光环
#[must_use]
pub fn flash_rings(positions: &dyn PositionLookup, flashes: &[(Lane, FlashRing)]) -> Vec<Ring> {
    flashes
        .iter()
        .filter_map(|(lane, flash)| {
            let at = positions.position(lane)?;
            Some(Ring::stroked(
                at,
                flash.radius,
                flash.width,
                flash.color,
                flash.alpha,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::pattern::PatternSpec;
    use crate::config::Sys;

    fn fixtures() -> (LanePositions, Palette, Render) {
        let sys = Sys::default();
        (
            LanePositions::from_lanes(&sys.lanes),
            Palette::from_lanes(&sys.lanes),
            sys.render,
        )
    }

    #[test]
    fn targets_cover_only_positioned_lanes() {
        let (positions, palette, render) = fixtures();
        let rings = target_rings(&positions, &palette, &render);
        // hihatOpen 与 hihatFoot 没有位置
        assert_eq!(rings.len(), 3);
        let ring = rings.first().unwrap();
        assert!((ring.inner_radius - 7.5).abs() < 1e-6);
        assert!((ring.outer_radius - 32.5).abs() < 1e-6);
        assert!((ring.alpha - 0.2).abs() < 1e-6);
    }

    #[test]
    fn instruction_ring_shrinks_toward_target_time() {
        let (positions, palette, render) = fixtures();
        let spec = PatternSpec::new(4, [(4, Lane::from("snare")), (0, Lane::from("kick"))]);
        let mut pattern = Pattern::load(spec).unwrap();
        pattern.retime(120).unwrap();

        // snare 在 0.5s，0.0s 时刚出现；kick 在 0.0s 正好到达
        let rings = instruction_rings(&positions, &palette, &render, &pattern, 0.0);
        assert_eq!(rings.len(), 2);
        let snare = rings.first().unwrap();
        assert!((snare.inner_radius - 148.0).abs() < 1e-4);
        assert!((snare.alpha - 1.0).abs() < 1e-6);
        let kick = rings.get(1).unwrap();
        assert!((kick.outer_radius - 7.0).abs() < 1e-4);
        assert!((kick.alpha - 0.5).abs() < 1e-6);

        let rings = instruction_rings(&positions, &palette, &render, &pattern, 0.25);
        assert_eq!(rings.len(), 1);
        let half = rings.first().unwrap();
        assert!((half.inner_radius + 2.0 - 77.5).abs() < 1e-3);
        assert!((half.alpha - 0.75).abs() < 1e-6);
    }
}

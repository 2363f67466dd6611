//! 练习谱面：解析谱面文档并将步号换算为秒
//!
//! 谱面文档为 JSON：
//!
//! ```json
//! { "subdivision": 4, "bgmStartOffset": 1.5,
//!   "pattern": [{ "step": 0, "note": "kick" }, { "step": 4, "note": 37 }] }
//! ```
//!
//! `note` 可以是轨道名，也可以是 MIDI 音符号（通过按键映射解析为轨道）。

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::Result;
use async_fs as afs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoachError;
use crate::loops::key_map::KeyMap;

/// 缺省的每拍细分数
pub const DEFAULT_SUBDIVISION: i64 = 4;

/// 轨道标识（如 `kick`、`snare`、`hihat`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lane(String);

impl Lane {
    /// 创建轨道标识
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 轨道名字符串
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Lane {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 谱面文档中的音符引用
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NoteRef {
    /// MIDI 音符号
    Midi(u8),
    /// 轨道名
    Lane(Lane),
}

/// 谱面文档中的单个步
#[derive(Deserialize, Debug, Clone)]
pub struct StepDoc {
    /// 步号（允许读入负数，由加载时校验）
    pub step: i64,
    /// 音符引用
    pub note: NoteRef,
}

/// 谱面文档（JSON 原始结构）
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PatternDoc {
    /// 每拍细分数，缺省为 4
    #[serde(default = "default_subdivision")]
    pub subdivision: i64,
    /// 伴奏开始时刻（秒）
    #[serde(default)]
    pub bgm_start_offset: Option<f64>,
    /// 步列表（作者书写顺序）
    #[serde(default)]
    pub pattern: Vec<StepDoc>,
}

const fn default_subdivision() -> i64 {
    DEFAULT_SUBDIVISION
}

impl PatternDoc {
    /// 将音符引用解析为轨道，得到可加载的谱面规格
    ///
    /// # Errors
    ///
    /// - 引用了按键映射中不存在的 MIDI 音符号
    pub fn resolve(self, key_map: &KeyMap) -> Result<PatternSpec, CoachError> {
        let mut steps = Vec::with_capacity(self.pattern.len());
        for StepDoc { step, note } in self.pattern {
            let lane = match note {
                NoteRef::Lane(lane) => lane,
                NoteRef::Midi(n) => key_map.lane_for_midi(n).cloned().ok_or_else(|| {
                    CoachError::MalformedPattern(format!("MIDI 音符 {n} 未映射到任何轨道"))
                })?,
            };
            steps.push((step, lane));
        }
        Ok(PatternSpec {
            subdivision: self.subdivision,
            bgm_start_offset: self.bgm_start_offset,
            steps,
        })
    }
}

/// 已解析轨道、尚未校验的谱面规格
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSpec {
    /// 每拍细分数
    pub subdivision: i64,
    /// 伴奏开始时刻（秒）
    pub bgm_start_offset: Option<f64>,
    /// （步号, 轨道）列表，顺序无要求
    pub steps: Vec<(i64, Lane)>,
}

impl PatternSpec {
    /// 以缺省细分数和给定步列表构建规格
    #[must_use]
    pub fn new(subdivision: i64, steps: impl IntoIterator<Item = (i64, Lane)>) -> Self {
        Self {
            subdivision,
            bgm_start_offset: None,
            steps: steps.into_iter().collect(),
        }
    }
}

/// 谱面事件
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEvent {
    /// 步号
    pub step: u64,
    /// 轨道
    pub note: Lane,
    /// 是否已被判定消费
    pub consumed: bool,
    /// 目标时刻（秒，相对演奏开始），由 `retime` 派生
    pub time: f64,
}

/// 谱面时间轴
///
/// 事件保持书写顺序存放，不保证按时间排序。
#[derive(Debug, Clone)]
pub struct Pattern {
    /// 每拍细分数
    subdivision: u32,
    /// 每步秒数，`retime` 之前为 0
    step_seconds: f64,
    /// 伴奏开始时刻（秒）
    bgm_start_offset: Option<f64>,
    /// 事件列表
    events: Vec<PatternEvent>,
}

impl Pattern {
    /// 校验并加载谱面规格
    ///
    /// 加载后所有事件时刻为 0，需调用 [`Pattern::retime`] 换算。
    ///
    /// # Errors
    ///
    /// - 细分数不为正
    /// - 任一步号为负
    pub fn load(spec: PatternSpec) -> Result<Self, CoachError> {
        let subdivision = u32::try_from(spec.subdivision)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                CoachError::MalformedPattern(format!("细分数必须为正: {}", spec.subdivision))
            })?;
        let mut events = Vec::with_capacity(spec.steps.len());
        for (step, note) in spec.steps {
            let step = u64::try_from(step)
                .map_err(|_| CoachError::MalformedPattern(format!("步号不能为负: {step}")))?;
            events.push(PatternEvent {
                step,
                note,
                consumed: false,
                time: 0.0,
            });
        }
        let bgm_start_offset = spec.bgm_start_offset.map(|t| t.max(0.0));
        Ok(Self {
            subdivision,
            step_seconds: 0.0,
            bgm_start_offset,
            events,
        })
    }

    /// 按给定速度重新计算全部事件时刻
    ///
    /// `stepSeconds = (60 / bpm) / subdivision`，`time = step * stepSeconds`。
    ///
    /// # Errors
    ///
    /// - `bpm` 为 0
    pub fn retime(&mut self, bpm: u32) -> Result<(), CoachError> {
        if bpm == 0 {
            return Err(CoachError::InvalidTempo(bpm));
        }
        self.step_seconds = 60.0 / f64::from(bpm) / f64::from(self.subdivision);
        for event in &mut self.events {
            event.time = event.step as f64 * self.step_seconds;
        }
        Ok(())
    }

    /// 返回该轨道上距 `instant` 不超过 `radius` 秒的全部未消费事件索引
    #[must_use]
    pub fn events_near(&self, instant: f64, note: &Lane, radius: f64) -> Vec<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, ev)| !ev.consumed && ev.note == *note)
            .filter(|(_, ev)| (instant - ev.time).abs() <= radius)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// 将事件标记为已消费
    ///
    /// 事件不存在或已消费时返回 `None`。
    pub fn consume(&mut self, index: usize) -> Option<&PatternEvent> {
        let event = self.events.get_mut(index)?;
        if event.consumed {
            return None;
        }
        event.consumed = true;
        Some(event)
    }

    /// 重置所有消费标记（仅用于演奏重新开始）
    pub fn reset_consumed(&mut self) {
        for event in &mut self.events {
            event.consumed = false;
        }
    }

    /// 全部事件（书写顺序）
    #[must_use]
    pub fn events(&self) -> &[PatternEvent] {
        &self.events
    }

    /// 按索引获取事件
    #[must_use]
    pub fn event(&self, index: usize) -> Option<&PatternEvent> {
        self.events.get(index)
    }

    /// 谱面中出现过的轨道
    #[must_use]
    pub fn lanes(&self) -> BTreeSet<&Lane> {
        self.events.iter().map(|ev| &ev.note).collect()
    }

    /// 每拍细分数
    #[must_use]
    pub const fn subdivision(&self) -> u32 {
        self.subdivision
    }

    /// 每步秒数
    #[must_use]
    pub const fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    /// 伴奏开始时刻
    #[must_use]
    pub const fn bgm_start_offset(&self) -> Option<f64> {
        self.bgm_start_offset
    }

    /// 事件数
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 是否没有事件
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// 从 JSON 字符串解析谱面规格
///
/// # Errors
///
/// - JSON 解析失败
/// - 引用了未映射的 MIDI 音符号
pub fn parse_pattern_str(s: &str, key_map: &KeyMap) -> Result<PatternSpec, CoachError> {
    let doc: PatternDoc =
        serde_json::from_str(s).map_err(|e| CoachError::MalformedPattern(e.to_string()))?;
    doc.resolve(key_map)
}

/// 读取谱面文件并解析
///
/// # Errors
///
/// - 读取文件失败
/// - 谱面解析失败
pub async fn load_pattern_file(path: &Path, key_map: &KeyMap) -> Result<PatternSpec> {
    let text = afs::read_to_string(path).await?;
    let spec = parse_pattern_str(&text, key_map)?;
    info!(
        path = %path.display(),
        subdivision = spec.subdivision,
        events = spec.steps.len(),
        "谱面已读取"
    );
    Ok(spec)
}

//! 系统配置定义与解析
//!
//! 配置文件为 TOML，所有字段都有缺省值；以 `_ms` 结尾的字段在读入时换算为秒。

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Deserializer};

use crate::chart::pattern::Lane;
use crate::judge::JudgeWindows;
use crate::loops::visual::{Color, Point3};

/// 系统运行时配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Sys {
    /// 速度配置
    pub tempo: Tempo,
    /// 判定配置
    pub judge: Judge,
    /// 闪光反馈配置
    pub flash: Flash,
    /// 前瞻调度配置
    pub scheduler: Scheduler,
    /// 圆环绘制配置
    pub render: Render,
    /// 轨道列表
    pub lanes: Vec<LaneConfig>,
}

/// 速度配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Tempo {
    /// 初始速度（BPM）
    pub bpm: u32,
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 100 }
    }
}

/// 判定配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Judge {
    /// 判定预设名（`Practice`、`Strict`）
    pub preset: String,
    /// 覆盖预设的 GOOD 半宽
    #[serde(rename = "judge_window_ms", deserialize_with = "de_opt_secs_ms")]
    pub judge_window: Option<f64>,
    /// 覆盖预设的 PERFECT 半宽
    #[serde(rename = "perfect_window_ms", deserialize_with = "de_opt_secs_ms")]
    pub perfect_window: Option<f64>,
    /// 覆盖预设的过去事件优先范围
    #[serde(rename = "close_threshold_ms", deserialize_with = "de_opt_secs_ms")]
    pub close_threshold: Option<f64>,
    /// 设备延迟补偿，加在击打到达时刻上
    #[serde(rename = "hit_offset_ms", deserialize_with = "de_secs_ms")]
    pub hit_offset: f64,
}

impl Default for Judge {
    fn default() -> Self {
        Self {
            preset: "Practice".to_owned(),
            judge_window: None,
            perfect_window: None,
            close_threshold: None,
            hit_offset: 0.0,
        }
    }
}

/// 判定预设接口
pub trait JudgePreset {
    /// 返回判定窗口
    fn windows(&self) -> JudgeWindows;
}

/// 练习判定预设
pub struct PracticePreset;
/// 严格判定预设
pub struct StrictPreset;

impl JudgePreset for PracticePreset {
    fn windows(&self) -> JudgeWindows {
        JudgeWindows {
            judge: 0.12,
            perfect: 0.03,
            close: 0.025,
        }
    }
}

impl JudgePreset for StrictPreset {
    fn windows(&self) -> JudgeWindows {
        JudgeWindows {
            judge: 0.08,
            perfect: 0.02,
            close: 0.015,
        }
    }
}

impl Judge {
    /// 根据预设名称创建判定窗配置实现
    #[must_use]
    pub fn preset_impl(&self) -> Box<dyn JudgePreset> {
        match self.preset.as_str() {
            "Strict" => Box::new(StrictPreset),
            _ => Box::new(PracticePreset),
        }
    }

    /// 获取判定窗口（预设叠加单项覆盖）
    #[must_use]
    pub fn windows(&self) -> JudgeWindows {
        let base = self.preset_impl().windows();
        JudgeWindows {
            judge: self.judge_window.unwrap_or(base.judge),
            perfect: self.perfect_window.unwrap_or(base.perfect),
            close: self.close_threshold.unwrap_or(base.close),
        }
    }
}

/// 闪光反馈配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Flash {
    /// PERFECT 闪光
    pub perfect: FlashStyle,
    /// GOOD 闪光
    pub good: FlashStyle,
}

impl Default for Flash {
    fn default() -> Self {
        Self {
            perfect: FlashStyle {
                duration: 0.4,
                radius: 90.0,
                width: 4.0,
                color: Color([1.0, 0.85, 0.2, 1.0]),
            },
            good: FlashStyle {
                duration: 0.12,
                radius: 70.0,
                width: 4.0,
                color: Color([0.89, 1.0, 0.89, 1.0]),
            },
        }
    }
}

/// 单档闪光样式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FlashStyle {
    /// 持续时间（秒）
    #[serde(rename = "duration_ms", deserialize_with = "de_secs_ms")]
    pub duration: f64,
    /// 圆环半径
    pub radius: f32,
    /// 圆环线宽
    pub width: f32,
    /// 颜色
    pub color: Color,
}

/// 已提交的设备触发在停止时的处理方式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// 保留已提交的触发，让其自然发声
    #[default]
    Drain,
    /// 主动取消尚未发声的触发
    Cancel,
}

/// 前瞻调度配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Scheduler {
    /// 控制定时器周期
    #[serde(rename = "period_ms", deserialize_with = "de_duration_ms")]
    pub period: Duration,
    /// 前瞻范围（秒）
    #[serde(rename = "horizon_ms", deserialize_with = "de_secs_ms")]
    pub horizon: f64,
    /// 每小节拍数（小节首拍使用重音）
    pub beats_per_bar: u32,
    /// 停止时已提交触发的处理方式
    pub on_stop: StopPolicy,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            horizon: 1.0,
            beats_per_bar: 4,
            on_stop: StopPolicy::Drain,
        }
    }
}

/// 圆环绘制配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Render {
    /// 固定目标环半径
    pub target_radius: f32,
    /// 固定目标环线宽
    pub target_width: f32,
    /// 目标环透明度
    pub target_alpha: f32,
    /// 指示环提前出现的时间（秒）
    #[serde(rename = "appear_offset_ms", deserialize_with = "de_secs_ms")]
    pub appear_offset: f64,
    /// 指示环初始半径
    pub instruction_max_radius: f32,
    /// 指示环到达时的半径
    pub instruction_min_radius: f32,
    /// 指示环线宽
    pub instruction_width: f32,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            target_radius: 20.0,
            target_width: 25.0,
            target_alpha: 0.2,
            appear_offset: 0.5,
            instruction_max_radius: 150.0,
            instruction_min_radius: 5.0,
            instruction_width: 4.0,
        }
    }
}

/// 轨道配置
#[derive(Deserialize, Clone, Debug)]
pub struct LaneConfig {
    /// 轨道标识
    pub id: Lane,
    /// 映射到该轨道的 MIDI 音符号
    #[serde(default)]
    pub midi: Vec<u8>,
    /// 映射到该轨道的按键代码
    #[serde(default)]
    pub keys: Vec<String>,
    /// 绘制位置（缺省表示该轨道没有标定位置）
    #[serde(default)]
    pub position: Option<Point3>,
    /// 轨道颜色
    pub color: Color,
}

impl LaneConfig {
    /// 构建轨道配置
    fn preset(
        id: &str,
        midi: &[u8],
        keys: &[&str],
        position: Option<Point3>,
        color: Color,
    ) -> Self {
        Self {
            id: Lane::from(id),
            midi: midi.to_vec(),
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            position,
            color,
        }
    }
}

/// 缺省轨道：三个标定位置的鼓件，外加两个只有音色没有位置的踩镲变体
#[must_use]
pub fn default_lanes() -> Vec<LaneConfig> {
    vec![
        LaneConfig::preset(
            "kick",
            &[36],
            &["KeyF"],
            Some(Point3::new(-0.7, 0.2, 0.0)),
            Color([1.0, 0.0, 0.0, 1.0]),
        ),
        LaneConfig::preset(
            "snare",
            &[37],
            &["KeyJ"],
            Some(Point3::new(0.0, 0.2, 0.0)),
            Color([0.0, 1.0, 0.0, 1.0]),
        ),
        LaneConfig::preset(
            "hihat",
            &[42],
            &["KeyK"],
            Some(Point3::new(0.7, 0.2, 0.0)),
            Color([0.0, 0.0, 1.0, 1.0]),
        ),
        LaneConfig::preset("hihatOpen", &[43], &["KeyL"], None, Color([0.0, 0.6, 1.0, 1.0])),
        LaneConfig::preset("hihatFoot", &[39], &["KeyD"], None, Color([0.3, 0.3, 1.0, 1.0])),
    ]
}

impl Default for Sys {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            judge: Judge::default(),
            flash: Flash::default(),
            scheduler: Scheduler::default(),
            render: Render::default(),
            lanes: default_lanes(),
        }
    }
}

impl Sys {
    /// 若未配置任何轨道则填入缺省轨道
    #[must_use]
    pub fn with_default_lanes(mut self) -> Self {
        if self.lanes.is_empty() {
            self.lanes = default_lanes();
        }
        self
    }
}

/// 从 TOML 字符串解析系统配置
///
/// # Errors
///
/// - TOML 解析失败
/// - 配置字段反序列化失败
pub fn parse_sys_str(s: &str) -> Result<Sys> {
    let cfg: Sys = toml::from_str(s)?;
    Ok(cfg.with_default_lanes())
}

/// 从指定路径加载系统配置（TOML）
///
/// # Errors
///
/// - 读取文件失败
/// - TOML 解析失败
/// - 配置字段反序列化失败
pub fn load_sys(path: &Path) -> Result<Sys> {
    let s = std::fs::read_to_string(path)?;
    parse_sys_str(&s)
}

/// 反序列化毫秒为秒
fn de_secs_ms<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = f64::deserialize(deserializer)?;
    Ok(ms / 1000.0)
}

/// 反序列化可选的毫秒为秒
fn de_opt_secs_ms<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = Option::<f64>::deserialize(deserializer)?;
    Ok(ms.map(|ms| ms / 1000.0))
}

/// 反序列化毫秒为 `Duration`
fn de_duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

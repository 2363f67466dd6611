//! 错误类型定义
//!
//! - `CoachError`：命令与谱面相关的错误，均可在本地恢复（拒绝命令或丢弃事件）
//! - `DeviceError`：音频设备拒绝预约触发时返回的错误，由调度器记录后跳过

use thiserror::Error;

use crate::chart::pattern::Lane;

/// 练习会话错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoachError {
    /// 谱面格式错误（细分数非法、步号为负或文档无法解析）
    #[error("谱面格式错误: {0}")]
    MalformedPattern(String),

    /// 未停止时重复开始演奏
    #[error("演奏已在进行中")]
    AlreadyRunning,

    /// 尚未加载有效谱面
    #[error("尚未加载谱面")]
    NoPattern,

    /// 谱面中没有任何事件
    #[error("谱面为空")]
    EmptyPattern,

    /// 速度必须为正整数
    #[error("非法速度: {0} BPM")]
    InvalidTempo(u32),

    /// 轨道不在位置表中
    #[error("未知轨道: {0}")]
    UnknownLane(Lane),
}

/// 音频设备错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// 预约时刻已经过去
    #[error("触发时刻 {at:.3}s 已过期（当前 {now:.3}s）")]
    PastDated {
        /// 请求的设备时刻（秒）
        at: f64,
        /// 设备当前时刻（秒）
        now: f64,
    },

    /// 设备拒绝预约（例如输出流已关闭）
    #[error("设备拒绝预约: {0}")]
    Rejected(String),
}

//! 音频设备接口
//!
//! - 设备以自身时钟上的绝对时刻预约触发，精度由设备保证
//! - 控制定时器只负责按批提交，不直接发声
//! - 混音拓扑（增益、声像、混响）不在本模块处理

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::DeviceError;

/// 设备可预约的音色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clip {
    /// 普通节拍
    Click,
    /// 小节首拍（重音）
    ClickHead,
    /// 伴奏
    Backing,
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => f.write_str("click"),
            Self::ClickHead => f.write_str("click-head"),
            Self::Backing => f.write_str("backing"),
        }
    }
}

/// 已提交触发的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(pub u64);

/// 支持按时刻预约的音频设备
pub trait AudioDevice: Send {
    /// 预约在设备时刻 `at`（秒，与 [`Clock`] 读数同一时基）播放音色
    ///
    /// # Errors
    ///
    /// - 预约时刻已经过去
    /// - 设备拒绝预约
    fn start_at(&mut self, clip: Clip, at: f64) -> Result<TriggerId, DeviceError>;

    /// 取消尚未发声的触发；已发声或不存在的句柄被忽略
    fn cancel(&mut self, id: TriggerId);
}

/// 不发声、只记录日志的设备
///
/// 早于当前时刻超过容差的预约被拒绝。
pub struct TracingDevice {
    /// 设备时钟
    clock: Arc<dyn Clock>,
    /// 下一个句柄编号
    next_id: u64,
    /// 尚未到期的触发
    pending: BTreeMap<TriggerId, (Clip, f64)>,
}

impl TracingDevice {
    /// 可接受的过期容差（秒）
    pub const LATE_TOLERANCE: f64 = 0.05;

    /// 以给定时钟创建设备
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }

    /// 尚未到期的触发数
    pub fn pending(&mut self) -> usize {
        let now = self.clock.now();
        self.pending.retain(|_, (_, at)| *at > now);
        self.pending.len()
    }
}

impl AudioDevice for TracingDevice {
    fn start_at(&mut self, clip: Clip, at: f64) -> Result<TriggerId, DeviceError> {
        let now = self.clock.now();
        if at < now - Self::LATE_TOLERANCE {
            return Err(DeviceError::PastDated { at, now });
        }
        let id = TriggerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        // 已到期的触发不再保留
        self.pending.retain(|_, (_, due)| *due >= now);
        self.pending.insert(id, (clip, at));
        trace!(%clip, at, lead = at - now, "预约触发");
        Ok(id)
    }

    fn cancel(&mut self, id: TriggerId) {
        if let Some((clip, at)) = self.pending.remove(&id) {
            debug!(%clip, at, "取消触发");
        }
    }
}

//! 事件循环模块入口
//!
//! 提供五个子模块：
//! - `audio`：音频设备接口与预约触发
//! - `key_map`：按键映射模块
//! - `main_loop`：串行任务队列，独占练习会话
//! - `scheduler`：节拍器与伴奏的前瞻调度
//! - `visual`：位置表、绘制接口与每帧圆环构建

pub mod audio;
pub mod key_map;
pub mod main_loop;
pub mod scheduler;
pub mod visual;

use crate::chart::pattern::{Lane, PatternSpec};

/// 原始按键代码（平台无关表示）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyCode(pub String);

/// 原始输入消息（从输入设备传递到 core）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInputMsg {
    /// MIDI 通道消息
    Midi {
        /// 状态字节
        status: u8,
        /// 音符号
        note: u8,
        /// 力度
        velocity: u8,
    },
    /// 键盘输入事件
    Key {
        /// 按键代码
        code: RawKeyCode,
    },
}

/// 输入事件消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMsg {
    /// 某轨道被击打
    Strike(Lane),
}

/// 串行任务队列中的工作单元
///
/// 输入回调、控制定时器与帧回调都只向队列投递任务，由主循环依次执行。
#[derive(Debug, Clone)]
pub enum Task {
    /// 载入谱面（整体替换）
    LoadPattern(PatternSpec),
    /// 开始演奏
    Start,
    /// 停止演奏
    Stop,
    /// 修改速度
    Retime(u32),
    /// 击打事件
    Strike {
        /// 轨道
        lane: Lane,
        /// 到达时刻（时钟读数，秒）
        arrival: f64,
    },
    /// 控制定时器节拍
    SchedulerTick {
        /// 发出该节拍的会话代号
        generation: u64,
    },
    /// 绘制一帧
    RenderFrame,
    /// 结束主循环
    Shutdown,
}

//! # Drum Coach - 终端平台实现
//!
//! 提供标准输入、帧计时线程与日志输出的终端前端

mod app;

use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use drum_coach::clock::{Clock, MonotonicClock};
use drum_coach::config::Sys;
use drum_coach::loops::audio::TracingDevice;
use drum_coach::loops::key_map::KeyMap;
use drum_coach::loops::{Task, main_loop};
use drum_coach::{Pattern, PatternSpec, Session};

pub use app::{Line, TracingSink, format_feedback, parse_line};

/// 帧计时线程的帧间隔
const FRAME: Duration = Duration::from_millis(16);

/// 按时刻排序的时间轴行：`step\tnote\ttime`
///
/// # Errors
///
/// - 谱面校验失败
/// - 速度为 0
pub fn timeline(spec: PatternSpec, bpm: u32) -> Result<Vec<String>> {
    let mut pattern = Pattern::load(spec)?;
    pattern.retime(bpm)?;
    let mut events: Vec<_> = pattern.events().iter().collect();
    events.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(events
        .into_iter()
        .map(|ev| format!("{}\t{}\t{:.3}", ev.step, ev.note, ev.time))
        .collect())
}

/// 运行交互式练习
///
/// 载入谱面并立即开始演奏；标准输入每行是一个或多个按键代码，
/// 也可输入 `start`、`stop`、`bpm <n>`、`midi <status> <note> <velocity>` 与 `quit`。
/// 判定结果逐行写到标准输出。
///
/// # Errors
///
/// - 配置的速度为 0
pub fn run(sys: &Sys, spec: PatternSpec) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let device = TracingDevice::new(clock.clone());
    let (feedback_tx, feedback_rx) = mpsc::channel();
    let session = Session::new(sys, clock.clone(), Box::new(device))?.with_feedback(feedback_tx);

    let (tasks_tx, tasks_rx) = mpsc::channel::<Task>();
    tasks_tx.send(Task::LoadPattern(spec))?;
    tasks_tx.send(Task::Start)?;

    let printer = app::spawn_feedback_printer(feedback_rx);
    let _ticker = app::spawn_frame_ticker(FRAME, tasks_tx.clone());
    let _input = app::spawn_input(KeyMap::new(&sys.lanes), clock, tasks_tx.clone());

    let mut sink = TracingSink::default();
    let session = main_loop::run(session, tasks_rx, tasks_tx, &mut sink);
    info!(rings = sink.rings(), "练习结束");
    // 释放反馈发送端，输出线程随之结束
    drop(session);
    let _ = printer.join();
    Ok(())
}

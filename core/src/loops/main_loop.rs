//! 主循环：串行执行任务队列并独占练习会话
//!
//! - 输入线程、控制定时器与帧计时线程只向队列投递任务
//! - 判定的扫描与标记因此对其他击打是原子的
//! - 开始演奏时启动带会话代号的控制定时器，停止时取消并等待其退出

use std::sync::mpsc;

use tracing::{debug, info, warn};

use crate::loops::Task;
use crate::loops::scheduler::ControlTimer;
use crate::loops::visual::RenderSink;
use crate::session::Session;

/// 运行主循环，直到收到 [`Task::Shutdown`]
///
/// 主循环自身持有 `tasks_tx` 以便启动控制定时器，队列因此不会自行关闭：
/// 外部发送端全部丢弃并不会结束循环，前端退出前必须投递 `Shutdown`。
///
/// - `session`：练习会话
/// - `tasks_rx`：任务队列接收端
/// - `tasks_tx`：同一队列的发送端，供控制定时器投递节拍
/// - `sink`：绘制接口
///
/// 返回结束时的会话，演奏已停止。
pub fn run(
    mut session: Session,
    tasks_rx: mpsc::Receiver<Task>,
    tasks_tx: mpsc::Sender<Task>,
    sink: &mut dyn RenderSink,
) -> Session {
    let mut timer: Option<ControlTimer> = None;
    let mut frames: u64 = 0;
    while let Ok(task) = tasks_rx.recv() {
        match task {
            Task::LoadPattern(spec) => {
                if let Err(e) = session.load(spec) {
                    warn!(error = %e, "载入谱面失败，保留原谱面");
                }
            }
            Task::Start => {
                // 先彻底取消上一次的定时器
                timer = None;
                match session.start() {
                    Ok(generation) => {
                        timer = Some(ControlTimer::spawn(
                            session.tick_period(),
                            tasks_tx.clone(),
                            generation,
                        ));
                    }
                    Err(e) => warn!(error = %e, "开始演奏被拒绝"),
                }
            }
            Task::Stop => {
                timer = None;
                session.stop();
            }
            Task::Retime(bpm) => {
                if let Err(e) = session.retime(bpm) {
                    warn!(error = %e, "修改速度被拒绝");
                }
            }
            Task::Strike { lane, arrival } => {
                session.strike(&lane, arrival);
            }
            Task::SchedulerTick { generation } => {
                session.scheduler_tick(generation);
            }
            Task::RenderFrame => {
                session.render(sink);
                frames = frames.saturating_add(1);
            }
            Task::Shutdown => break,
        }
        if !session.is_running() && timer.is_some() {
            debug!("演奏已结束，取消控制定时器");
            timer = None;
        }
    }
    drop(timer);
    session.stop();
    info!(frames, "主循环退出");
    session
}

mod common;

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use common::{RecordingDevice, RecordingSink};
use drum_coach::config::{StopPolicy, Sys};
use drum_coach::loops::{Task, main_loop};
use drum_coach::{Feedback, JudgeResult, Lane, ManualClock, PatternSpec, Session};

fn spawn_loop(
    sys: &Sys,
    clock: Arc<ManualClock>,
    device: RecordingDevice,
) -> (
    mpsc::Sender<Task>,
    mpsc::Receiver<Feedback>,
    thread::JoinHandle<(Session, RecordingSink)>,
) {
    let (fb_tx, fb_rx) = mpsc::channel();
    let session = Session::new(sys, clock, Box::new(device))
        .unwrap()
        .with_feedback(fb_tx);
    let (tx, rx) = mpsc::channel();
    let loop_tx = tx.clone();
    let handle = thread::spawn(move || {
        let mut sink = RecordingSink::default();
        let session = main_loop::run(session, rx, loop_tx, &mut sink);
        (session, sink)
    });
    (tx, fb_rx, handle)
}

#[test]
fn tasks_run_in_order_on_one_session() {
    let mut sys = Sys::default();
    sys.tempo.bpm = 120;
    let clock = Arc::new(ManualClock::new());
    let device = RecordingDevice::default();
    let (tx, fb_rx, handle) = spawn_loop(&sys, clock.clone(), device.clone());

    let spec = PatternSpec::new(4, [(0, Lane::from("kick")), (4, Lane::from("snare"))]);
    tx.send(Task::LoadPattern(spec)).unwrap();
    tx.send(Task::Start).unwrap();
    // 两次相同时刻的击打只产生一个判定
    for _ in 0..2 {
        tx.send(Task::Strike {
            lane: Lane::from("kick"),
            arrival: 0.01,
        })
        .unwrap();
    }
    tx.send(Task::RenderFrame).unwrap();
    tx.send(Task::Stop).unwrap();
    tx.send(Task::Shutdown).unwrap();

    let (session, sink) = handle.join().unwrap();
    assert!(!session.is_running());
    let verdicts: Vec<Feedback> = fb_rx.try_iter().collect();
    assert_eq!(verdicts.len(), 1);
    let Some(Feedback::Verdict(v)) = verdicts.first() else {
        panic!("expected a verdict, got {verdicts:?}");
    };
    assert_eq!(v.result, JudgeResult::Perfect);
    // 时钟停在 0：三个目标环 + kick、snare 指示环 + kick 闪光环
    assert_eq!(sink.pending().len(), 6);
    assert!(!device.starts().is_empty());
}

#[test]
fn rejected_commands_do_not_stop_the_loop() {
    let sys = Sys::default();
    let clock = Arc::new(ManualClock::new());
    let (tx, fb_rx, handle) = spawn_loop(&sys, clock, RecordingDevice::default());

    // 没有谱面时开始被拒绝，非法速度被拒绝，谱面错误时保留空状态
    tx.send(Task::Start).unwrap();
    tx.send(Task::Retime(0)).unwrap();
    tx.send(Task::LoadPattern(PatternSpec::new(0, Vec::new()))).unwrap();
    tx.send(Task::Strike {
        lane: Lane::from("kick"),
        arrival: 0.0,
    })
    .unwrap();
    tx.send(Task::Shutdown).unwrap();

    let (session, _) = handle.join().unwrap();
    assert!(session.pattern().is_none());
    assert_eq!(session.bpm(), 100);
    assert_eq!(fb_rx.try_iter().count(), 0);
}

/// 轮询直到条件成立，超过 2s 视为失败
fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn control_timer_feeds_scheduler_until_stop() {
    let mut sys = Sys::default();
    sys.tempo.bpm = 240;
    sys.scheduler.period = Duration::from_millis(5);
    sys.scheduler.on_stop = StopPolicy::Cancel;
    let clock = Arc::new(ManualClock::new());
    let device = RecordingDevice::default();
    let (tx, _fb_rx, handle) = spawn_loop(&sys, clock.clone(), device.clone());

    let spec = PatternSpec::new(4, [(0, Lane::from("kick"))]);
    tx.send(Task::LoadPattern(spec)).unwrap();
    tx.send(Task::Start).unwrap();
    // 开始时前瞻 1s：240 BPM 下 4 拍
    wait_until("initial look-ahead", || device.starts().len() >= 4);
    assert_eq!(device.starts().len(), 4);

    // 推进时钟后，定时器节拍继续提交
    clock.advance(0.5);
    wait_until("second look-ahead", || device.starts().len() >= 6);
    assert_eq!(device.starts().len(), 6);

    // 取消策略下停止会撤回 0.5s 之后的 4 个触发，此时定时器已退出
    tx.send(Task::Stop).unwrap();
    wait_until("stop", || device.cancelled() > 0);
    assert_eq!(device.cancelled(), 4);
    clock.advance(1.0);

    tx.send(Task::Shutdown).unwrap();
    let (session, _) = handle.join().unwrap();
    assert!(!session.is_running());
    assert_eq!(device.starts().len(), 6);
}

#[test]
fn shutdown_ends_loop_while_timer_is_running() {
    let mut sys = Sys::default();
    sys.scheduler.period = Duration::from_millis(5);
    let clock = Arc::new(ManualClock::new());
    let device = RecordingDevice::default();
    let (tx, _fb_rx, handle) = spawn_loop(&sys, clock, device.clone());

    let spec = PatternSpec::new(4, [(0, Lane::from("kick"))]);
    tx.send(Task::LoadPattern(spec)).unwrap();
    tx.send(Task::Start).unwrap();
    wait_until("timer ticks", || !device.starts().is_empty());

    // 主循环自己持有定时器的发送端，外部发送端全部关闭也不会结束，只能靠 Shutdown
    tx.send(Task::Shutdown).unwrap();
    drop(tx);
    let (session, _) = handle.join().unwrap();
    assert!(!session.is_running());
}

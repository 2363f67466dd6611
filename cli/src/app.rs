//! 终端前端：标准输入解析、帧计时线程与反馈输出

use std::io::BufRead;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use drum_coach::clock::Clock;
use drum_coach::loops::key_map::KeyMap;
use drum_coach::loops::visual::{Color, Point3, RenderSink};
use drum_coach::loops::{InputMsg, RawInputMsg, RawKeyCode, Task};
use drum_coach::session::Feedback;

/// 只记录日志的绘制接口
#[derive(Default)]
pub struct TracingSink {
    /// 已绘制的圆环数
    rings: u64,
}

impl TracingSink {
    /// 已绘制的圆环数
    #[must_use]
    pub const fn rings(&self) -> u64 {
        self.rings
    }
}

impl RenderSink for TracingSink {
    fn draw_ring(
        &mut self,
        at: Point3,
        inner_radius: f32,
        outer_radius: f32,
        color: Color,
        alpha: f32,
    ) {
        trace!(
            x = at.x,
            y = at.y,
            inner_radius,
            outer_radius,
            ?color,
            alpha,
            "ring"
        );
        self.rings = self.rings.saturating_add(1);
    }
}

/// 一行标准输入的解释结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// 原始输入（按键代码或 MIDI 消息）
    Input(RawInputMsg),
    /// 开始演奏
    Start,
    /// 停止演奏
    Stop,
    /// 修改速度
    Bpm(u32),
    /// 退出
    Quit,
}

/// 解析一行输入
///
/// - `start` / `stop` / `quit`
/// - `bpm <n>`
/// - `midi <status> <note> <velocity>`，数值可写十进制或 `0x` 十六进制
/// - 其余每个空白分隔的单词都视为一次按键
#[must_use]
pub fn parse_line(line: &str) -> Vec<Line> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Vec::new(),
        ["start"] => vec![Line::Start],
        ["stop"] => vec![Line::Stop],
        ["quit" | "exit"] => vec![Line::Quit],
        ["bpm", n] => n.parse().map(Line::Bpm).into_iter().collect(),
        ["midi", status, note, velocity] => {
            match (parse_byte(status), parse_byte(note), parse_byte(velocity)) {
                (Some(status), Some(note), Some(velocity)) => vec![Line::Input(RawInputMsg::Midi {
                    status,
                    note,
                    velocity,
                })],
                _ => Vec::new(),
            }
        }
        keys => keys
            .iter()
            .map(|k| {
                Line::Input(RawInputMsg::Key {
                    code: RawKeyCode((*k).to_owned()),
                })
            })
            .collect(),
    }
}

/// 解析十进制或 `0x` 前缀十六进制字节
fn parse_byte(s: &str) -> Option<u8> {
    s.strip_prefix("0x")
        .map_or_else(|| s.parse().ok(), |hex| u8::from_str_radix(hex, 16).ok())
}

/// 启动标准输入线程：逐行解析并投递任务，读到结尾或 `quit` 时投递停止与退出
pub fn spawn_input(
    key_map: KeyMap,
    clock: Arc<dyn Clock>,
    tasks: mpsc::Sender<Task>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            // 到达时刻在读到整行时记录
            let arrival = clock.now();
            for parsed in parse_line(&line) {
                let task = match parsed {
                    Line::Start => Task::Start,
                    Line::Stop => Task::Stop,
                    Line::Bpm(bpm) => Task::Retime(bpm),
                    Line::Quit => {
                        let _ = tasks.send(Task::Stop);
                        let _ = tasks.send(Task::Shutdown);
                        return;
                    }
                    Line::Input(raw) => match key_map.convert(raw.clone()) {
                        Some(InputMsg::Strike(lane)) => Task::Strike { lane, arrival },
                        None => {
                            warn!(?raw, "未映射的输入，已忽略");
                            continue;
                        }
                    },
                };
                if tasks.send(task).is_err() {
                    return;
                }
            }
        }
        let _ = tasks.send(Task::Stop);
        let _ = tasks.send(Task::Shutdown);
    })
}

/// 启动帧计时线程，按固定帧间隔投递绘制任务，主循环退出后结束
pub fn spawn_frame_ticker(frame: Duration, tasks: mpsc::Sender<Task>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut next_tick = Instant::now();
        loop {
            let Some(t) = next_tick.checked_add(frame) else {
                next_tick = Instant::now();
                continue;
            };
            next_tick = t;
            if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            } else {
                next_tick = Instant::now();
            }
            if tasks.send(Task::RenderFrame).is_err() {
                break;
            }
        }
    })
}

/// 将反馈格式化为一行输出
#[must_use]
pub fn format_feedback(feedback: &Feedback) -> String {
    match feedback {
        Feedback::Verdict(v) => {
            let timing = if v.diff > 0.0 { "late" } else { "early" };
            format!(
                "{}\t{}\t{:+.1}ms\t{}",
                v.result,
                v.event.note,
                v.diff * 1000.0,
                timing
            )
        }
        Feedback::Dropped(e) => format!("DROPPED\t{e}"),
    }
}

/// 启动反馈输出线程，发送端全部关闭后结束
pub fn spawn_feedback_printer(feedback: mpsc::Receiver<Feedback>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for fb in feedback {
            println!("{}", format_feedback(&fb));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drum_coach::judge::{JudgeResult, Verdict};
    use drum_coach::{CoachError, Lane, PatternEvent};

    #[test]
    fn commands_and_keys_are_parsed() {
        assert_eq!(parse_line("  "), Vec::new());
        assert_eq!(parse_line("start"), vec![Line::Start]);
        assert_eq!(parse_line("bpm 140"), vec![Line::Bpm(140)]);
        assert_eq!(parse_line("bpm fast"), Vec::new());
        assert_eq!(
            parse_line("KeyF KeyJ"),
            vec![
                Line::Input(RawInputMsg::Key {
                    code: RawKeyCode("KeyF".to_owned())
                }),
                Line::Input(RawInputMsg::Key {
                    code: RawKeyCode("KeyJ".to_owned())
                }),
            ]
        );
    }

    #[test]
    fn midi_line_accepts_hex_status() {
        assert_eq!(
            parse_line("midi 0x99 36 100"),
            vec![Line::Input(RawInputMsg::Midi {
                status: 0x99,
                note: 36,
                velocity: 100,
            })]
        );
        assert_eq!(parse_line("midi 0x99 300 100"), Vec::new());
    }

    #[test]
    fn feedback_lines() {
        let verdict = Verdict {
            index: 0,
            event: PatternEvent {
                step: 4,
                note: Lane::from("snare"),
                consumed: true,
                time: 0.5,
            },
            result: JudgeResult::Good,
            diff: -0.05,
        };
        assert_eq!(
            format_feedback(&Feedback::Verdict(verdict)),
            "GOOD\tsnare\t-50.0ms\tearly"
        );
        let dropped = Feedback::Dropped(CoachError::UnknownLane(Lane::from("cowbell")));
        assert!(format_feedback(&dropped).starts_with("DROPPED\t"));
    }
}

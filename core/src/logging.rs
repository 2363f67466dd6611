//! 日志系统初始化模块

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, fmt};

/// 缺省日志过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 时间格式：只显示 HH:MM:SS.微秒（UTC）
struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let total_secs = now.as_secs();
        let h = (total_secs / 3600) % 24;
        let m = (total_secs / 60) % 60;
        let s = total_secs % 60;
        write!(w, "{h:02}:{m:02}:{s:02}.{:06}", now.subsec_micros())
    }
}

/// 以缺省过滤规则初始化全局日志系统
///
/// 环境变量 `RUST_LOG` 优先：
///
/// ```bash
/// RUST_LOG=debug drum-coach play --pattern assets/patterns/basic_rock.json
/// RUST_LOG=drum_coach::loops::scheduler=trace drum-coach play --pattern ...
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// 以给定的缺省过滤规则初始化全局日志系统
///
/// 日志写到标准错误，标准输出留给命令的结果。重复初始化时保持已安装的订阅者。
pub fn init_logging_with(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .with_timer(ClockTime)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
    if installed.is_err() {
        tracing::debug!("日志系统已初始化，跳过");
    }
}

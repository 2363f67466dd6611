//! # Drum Coach 主程序

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_lite::future;
use tracing::info;

use drum_coach::chart::pattern::load_pattern_file;
use drum_coach::config::{Sys, load_sys};
use drum_coach::logging;
use drum_coach::loops::key_map::KeyMap;

/// 缺省配置文件路径
const DEFAULT_CONFIG: &str = "config_sys.toml";

#[derive(Parser)]
/// 命令行参数
struct ExecArgs {
    #[arg(long, global = true)]
    /// 系统配置文件路径（缺省读取当前目录的 config_sys.toml，不存在时使用内置缺省值）
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    /// 覆盖配置中的速度（BPM）
    bpm: Option<u32>,
    #[command(subcommand)]
    /// 子命令
    command: Command,
}

#[derive(Subcommand)]
/// 子命令
enum Command {
    /// 打印按速度换算后的谱面时间轴
    Timeline {
        #[arg(long)]
        /// 谱面文件路径（JSON）
        pattern: PathBuf,
    },
    /// 从标准输入读取击打进行练习
    Play {
        #[arg(long)]
        /// 谱面文件路径（JSON）
        pattern: PathBuf,
    },
}

/// 读取系统配置
fn load_config(path: Option<&Path>) -> Result<Sys> {
    match path {
        Some(path) => load_sys(path),
        None if Path::new(DEFAULT_CONFIG).exists() => load_sys(Path::new(DEFAULT_CONFIG)),
        None => {
            info!("未找到 {DEFAULT_CONFIG}，使用内置缺省配置");
            Ok(Sys::default())
        }
    }
}

fn main() -> Result<()> {
    let args = ExecArgs::parse();
    logging::init_logging();
    let mut sys = load_config(args.config.as_deref())?;
    if let Some(bpm) = args.bpm {
        sys.tempo.bpm = bpm;
    }
    let key_map = KeyMap::new(&sys.lanes);

    match args.command {
        Command::Timeline { pattern } => {
            let spec = future::block_on(load_pattern_file(&pattern, &key_map))?;
            for line in drum_coach_cli::timeline(spec, sys.tempo.bpm)? {
                println!("{line}");
            }
        }
        Command::Play { pattern } => {
            let spec = future::block_on(load_pattern_file(&pattern, &key_map))?;
            drum_coach_cli::run(&sys, spec)?;
        }
    }
    Ok(())
}

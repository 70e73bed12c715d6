//! Fenn CLI
//!
//! 无头运行器：编译脚本（或 fenn.json 项目）后以壁钟驱动
//! 调度器，直到全部进程死亡、脚本请求退出或帧数预算用尽。
//! 编译失败在任何调度开始前以非零码退出。

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::debug;

use fenn_core::{HostClock, Interpreter};

mod config;
mod logging;

use config::{LogConfig, LogFormat, ProjectConfig};

/// 编译失败的退出码
const EXIT_COMPILE_ERROR: i32 = 65;
/// 输入无法读取的退出码
const EXIT_BAD_INPUT: i32 = 66;

#[derive(Parser)]
#[command(name = "fenn", version, about = "Fenn 帧驱动脚本语言运行器")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 全局日志级别: trace / debug / info / warn / error
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// 日志格式: pretty / compact / json
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    /// 追加写入的日志文件
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// 编译并运行脚本或项目目录
    Run {
        /// .fenn 脚本或含 fenn.json 的项目目录
        path: PathBuf,

        /// 宿主时钟目标帧率
        #[arg(long)]
        fps: Option<f64>,

        /// 最多执行的宿主帧数（0 为不限）
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// 编译并打印全部函数与进程模板的反汇编
    Dis {
        /// .fenn 脚本或含 fenn.json 的项目目录
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let log_config = LogConfig::from_level_str(&cli.log_level);
    let format = LogFormat::from_str(&cli.log_format);
    logging::init_with_file(&log_config, format, cli.log_file.as_ref());

    let code = match cli.command {
        Command::Run {
            path,
            fps,
            max_frames,
        } => run(&path, fps, max_frames),
        Command::Dis { path } => disassemble(&path),
    };
    process::exit(code);
}

/// 解析后的执行输入
struct LoadedProject {
    source: String,
    fps: Option<f64>,
    max_frames: Option<u64>,
}

/// 读取脚本文件或项目目录
fn load_project(path: &Path) -> Result<LoadedProject, String> {
    if path.is_dir() {
        let manifest_path = path.join("fenn.json");
        let manifest = std::fs::read_to_string(&manifest_path)
            .map_err(|e| format!("Failed to read {}: {e}", manifest_path.display()))?;
        let project: ProjectConfig = serde_json::from_str(&manifest)
            .map_err(|e| format!("Invalid {}: {e}", manifest_path.display()))?;
        let entry = path.join(&project.entry);
        let source = std::fs::read_to_string(&entry)
            .map_err(|e| format!("Failed to read {}: {e}", entry.display()))?;
        debug!(entry = %entry.display(), "project loaded");
        Ok(LoadedProject {
            source,
            fps: project.fps,
            max_frames: project.max_frames,
        })
    } else {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Ok(LoadedProject {
            source,
            fps: None,
            max_frames: None,
        })
    }
}

fn run(path: &Path, fps: Option<f64>, max_frames: Option<u64>) -> i32 {
    let project = match load_project(path) {
        Ok(p) => p,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_BAD_INPUT;
        }
    };

    let mut interp = Interpreter::new();
    if let Err(err) = interp.compile(&project.source) {
        eprintln!("{err}");
        return EXIT_COMPILE_ERROR;
    }

    let fps = fps.or(project.fps).unwrap_or(60.0);
    let budget = max_frames.or(project.max_frames).unwrap_or(0);
    let mut clock = WallClock::new(fps, budget);
    interp.run(&mut clock)
}

fn disassemble(path: &Path) -> i32 {
    let project = match load_project(path) {
        Ok(p) => p,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_BAD_INPUT;
        }
    };

    let mut interp = Interpreter::new();
    if let Err(err) = interp.compile(&project.source) {
        eprintln!("{err}");
        return EXIT_COMPILE_ERROR;
    }
    print!("{}", interp.disassemble());
    0
}

/// 壁钟宿主时钟
///
/// 按目标帧率补眠，dt 取真实经过的秒数；帧数预算为 0 时
/// 不设上限。
struct WallClock {
    last: Instant,
    frame_duration: Duration,
    frames_left: Option<u64>,
}

impl WallClock {
    fn new(fps: f64, max_frames: u64) -> Self {
        let fps = fps.max(1.0);
        Self {
            last: Instant::now(),
            frame_duration: Duration::from_secs_f64(1.0 / fps),
            frames_left: if max_frames == 0 { None } else { Some(max_frames) },
        }
    }
}

impl HostClock for WallClock {
    fn tick(&mut self) -> f64 {
        let target = self.last + self.frame_duration;
        let now = Instant::now();
        if now < target {
            std::thread::sleep(target - now);
        }
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        dt
    }

    fn should_continue(&mut self) -> bool {
        match &mut self.frames_left {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

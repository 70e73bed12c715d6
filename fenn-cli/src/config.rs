//! CLI 配置
//!
//! 日志配置（全局级别加各子系统覆盖）与 fenn.json 项目配置。

use serde::Deserialize;
use tracing::Level;

/// 项目配置文件 `fenn.json`
///
/// 命令行参数优先于文件内容。
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// 入口文件路径（相对项目目录）
    pub entry: String,
    /// 宿主时钟目标帧率，缺省 60
    #[serde(default)]
    pub fps: Option<f64>,
    /// 最多执行的宿主帧数，0 或缺省为不限
    #[serde(default)]
    pub max_frames: Option<u64>,
}

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub lexer: Option<Level>,
    pub compiler: Option<Level>,
    pub vm: Option<Level>,
    pub sched: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::INFO,
            lexer: None,
            compiler: None,
            vm: None,
            sched: None,
        }
    }
}

impl LogConfig {
    /// 从 `--log-level` 字符串构造
    pub fn from_level_str(level: &str) -> Self {
        let global = match level.to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        Self {
            global,
            ..Self::default()
        }
    }

    /// 指定 target 的生效级别
    pub fn level_for(&self, target: &str) -> Level {
        match target {
            "fenn::lexer" => self.lexer.unwrap_or(self.global),
            "fenn::compiler" => self.compiler.unwrap_or(self.global),
            "fenn::vm" => self.vm.unwrap_or(self.global),
            "fenn::sched" => self.sched.unwrap_or(self.global),
            _ => self.global,
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分子系统日志控制。

use std::io;

use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::config::{LogConfig, LogFormat};

/// 使用指定格式和日志配置初始化日志系统
pub fn init_with_file(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<&std::path::PathBuf>,
) {
    let targets = Targets::new()
        .with_default(log_config.global)
        .with_target("fenn::lexer", log_config.level_for("fenn::lexer"))
        .with_target("fenn::compiler", log_config.level_for("fenn::compiler"))
        .with_target("fenn::vm", log_config.level_for("fenn::vm"))
        .with_target("fenn::sched", log_config.level_for("fenn::sched"));

    // 指定日志文件时同时输出到终端与文件
    if let Some(path) = file {
        let file_handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("Failed to open log file");

        let stderr_layer = create_format_layer(format, io::stderr).with_filter(targets.clone());

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || file_handle.try_clone().expect("Failed to clone file handle"))
            .with_filter(targets);

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        let stderr_layer = create_format_layer(format, io::stderr).with_filter(targets);
        tracing_subscriber::registry().with(stderr_layer).init();
    }
}

/// 按格式构建输出层
fn create_format_layer<W, F>(
    format: LogFormat,
    make_writer: F,
) -> Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>
where
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(make_writer)
            .boxed(),
    }
}

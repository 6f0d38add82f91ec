use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use thiserror::Error;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 日志行格式 `<timestamp> - <target> - <LEVEL> - <message>`，每个事件一行
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            metadata.target(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// 构建文件 + 控制台双输出的subscriber，但不安装
///
/// 必要时创建 `log_file` 的上级目录并以追加方式写入，每行同时输出到stdout。
/// 默认级别为 `debug`，可通过 `RUST_LOG` 调整。
///
/// 可配合 [`tracing::subscriber::with_default`] 在局部范围内使用。
///
/// # 错误处理
/// 目录或文件无法创建时返回 [`LoggingError::Io`]
pub fn build_subscriber(log_file: &Path) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    let io_error = |source| LoggingError::Io { path: log_file.to_path_buf(), source };

    if let Some(dir) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(io_error)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(tfmt::layer().event_format(LineFormat).with_writer(Mutex::new(file)))
        .with(tfmt::layer().event_format(LineFormat).with_writer(io::stdout)))
}

/// 为整个进程安装日志，写入 [`Config::log_file`]
///
/// 启动时调用一次，再次调用返回 [`LoggingError::AlreadyInitialized`]。
pub fn init(config: &Config) -> Result<(), LoggingError> {
    let subscriber = build_subscriber(&config.log_file())?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

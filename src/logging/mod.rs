//! 日志系统.
//!
//! 控制台输出带颜色的简短格式, 文件输出按天滚动并经由非阻塞写线程落盘.
//! 库 crate 通过 `log` 门面产生的记录会经 `tracing-log` 桥接汇入同一订阅器.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// 覆盖日志级别的环境变量名
pub const LOG_ENV_VAR: &str = "YING_LOG";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 过滤指令, 例如 `info` 或 `ying=debug,ying_codec=trace`
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// 是否同时输出到控制台
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: default_directory(),
            file_prefix: default_file_prefix(),
            console: true,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_directory() -> String {
    "logs".to_string()
}

fn default_file_prefix() -> String {
    "ying".to_string()
}

fn default_true() -> bool {
    true
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志订阅器
///
/// 同一进程内只能成功调用一次, 重复调用返回错误.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if LOG_GUARD.get().is_some() {
        anyhow::bail!("日志系统已初始化");
    }

    let directives = resolve_filter(&config.level, std::env::var(LOG_ENV_VAR).ok());
    // 先校验一次, 便于把错误指令报告给调用方
    EnvFilter::try_new(&directives)
        .with_context(|| format!("无效的日志过滤指令: {}", directives))?;

    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| format!("创建滚动日志文件失败, dir={}", config.directory))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(EnvFilter::new(&directives));

    let console_layer = config.console.then(|| {
        fmt::Layer::default()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .event_format(ConsoleFormatter)
            .with_filter(EnvFilter::new(&directives))
    });

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("注册全局日志订阅器失败")?;

    LOG_GUARD.set(guard).ok();
    Ok(())
}

/// 计算最终生效的过滤指令, 环境变量非空时优先
pub fn resolve_filter(level: &str, env_override: Option<String>) -> String {
    match env_override {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => level.to_string(),
    }
}

/// 指定日期对应的日志文件路径
pub fn current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write_timestamp(&mut writer)?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "{}{:5}\x1b[0m {} > ",
            color,
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write_timestamp(&mut writer)?;
        write!(
            writer,
            "{:5} {}:{} > ",
            meta.level().to_string(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0)
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn write_timestamp(writer: &mut Writer<'_>) -> std::fmt::Result {
    let now = Local::now();
    write!(
        writer,
        "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_log_path() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 6);
        match date {
            Some(date) => {
                let path = current_log_path(Path::new("logs"), "ying", date);
                assert_eq!(path, PathBuf::from("logs/ying.2026-02-06.log"));
            }
            None => panic!("测试日期初始化失败"),
        }
    }

    #[test]
    fn test_环境变量覆盖级别() {
        assert_eq!(resolve_filter("info", None), "info");
        assert_eq!(resolve_filter("info", Some("  ".into())), "info");
        assert_eq!(
            resolve_filter("info", Some(" ying_codec=trace ".into())),
            "ying_codec=trace"
        );
    }

    #[test]
    fn test_配置默认值() {
        let config: LoggingConfig = match serde_json::from_str(r#"{"level":"debug"}"#) {
            Ok(c) => c,
            Err(err) => panic!("解析日志配置失败: {}", err),
        };
        assert_eq!(config.level, "debug");
        assert_eq!(config.directory, "logs");
        assert_eq!(config.file_prefix, "ying");
        assert!(config.console);
    }
}

use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use time::macros::format_description;
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

static INSTALLED: OnceCell<()> = OnceCell::new();

/**
 * \brief 日志输出选项。
 */
#[derive(Debug, Clone, Default)]
pub struct TelemetryOptions {
    /** \brief 为真时追加写入 logs/prism.log，否则输出到 stderr */
    pub log_file: bool,
}

/**
 * \brief 日志文件位置。
 */
pub fn log_path() -> PathBuf {
    PathBuf::from("logs").join("prism.log")
}

/**
 * \brief 安装全局 tracing subscriber；过滤级别取自 `PRISM_LOG`，默认 info。重复调用无副作用。
 */
pub fn init(options: &TelemetryOptions) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_env("PRISM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
    ));

    let installed = if options.log_file {
        let path = log_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("create log directory failed")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {} failed", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(timer)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(timer)
            .with_writer(std::io::stderr)
            .try_init()
    };
    // 其他组件可能已安装 subscriber，此时沿用即可
    if let Err(err) = installed {
        tracing::debug!("tracing subscriber already set: {}", err);
    }
    let _ = INSTALLED.set(());
    Ok(())
}

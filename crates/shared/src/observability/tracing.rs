//! 日志
//!
//! 生产环境输出 JSON 行，本地开发输出带颜色的文本。

use anyhow::Result;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use super::ObservabilityConfig;

/// `RUST_LOG` 优先，其次配置中的级别，都无法解析时用 info
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let layer = if config.json_logs {
        // 对账 span 关闭时输出耗时
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(layer)
        .try_init()?;
    Ok(())
}

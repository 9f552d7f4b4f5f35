//! 可观测性
//!
//! 日志与 Prometheus 指标在启动时一次性初始化，返回的守卫需要存活到进程退出。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 由 `AppConfig::load` 按服务名覆盖
    pub service_name: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    /// `RUST_LOG` 未设置时使用的过滤表达式
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// 持有指标 HTTP 服务
pub struct ObservabilityGuard {
    _metrics: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("可观测性组件关闭");
    }
}

pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        "可观测性已初始化"
    );
    Ok(ObservabilityGuard { _metrics: metrics })
}

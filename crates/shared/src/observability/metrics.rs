//! Prometheus 指标
//!
//! `/metrics` 与 `/health` 由独立端口上的 axum 服务提供。
//! 未安装 recorder 时下面的记录函数为空操作，单元测试无需初始化。

use std::net::SocketAddr;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 指标服务句柄，drop 时停止 HTTP 服务
pub struct MetricsHandle {
    server: JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve(addr, handle).await?;
    Ok(MetricsHandle { server })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!(
        "reconciliations_total",
        "Order lifecycle reconciliations by command and outcome"
    );
    metrics::describe_histogram!(
        "reconciliation_duration_seconds",
        "Reconciliation duration in seconds"
    );
    metrics::describe_counter!(
        "reconciliation_failures_total",
        "Failed reconciliations by command and error code"
    );
    metrics::describe_counter!(
        "balance_notifications_total",
        "Balance update notifications by transaction type and status"
    );
    metrics::describe_counter!(
        "merchant_identifications_total",
        "Merchant identification attempts by result"
    );
    metrics::describe_counter!(
        "summary_update_conflicts_total",
        "Version conflicts on promotion and summary writes"
    );
    metrics::describe_counter!(
        "cache_fallbacks_total",
        "Cache failures that fell back to the loader"
    );
    metrics::describe_counter!(
        "dead_letters_total",
        "Dead-lettered transaction messages by stage"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "指标服务已监听");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标服务异常退出");
        }
    }))
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次生命周期对账
#[inline]
pub fn record_reconciliation(command: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "reconciliations_total",
        "command" => command.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "reconciliation_duration_seconds",
        "command" => command.to_string()
    )
    .record(duration_secs);
}

/// 记录对账失败，按错误码区分
#[inline]
pub fn record_reconciliation_failure(command: &str, code: &str) {
    metrics::counter!(
        "reconciliation_failures_total",
        "command" => command.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// 记录余额变更通知发送结果
#[inline]
pub fn record_balance_notification(transaction_type: &str, status: &str) {
    metrics::counter!(
        "balance_notifications_total",
        "transaction_type" => transaction_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录商户识别结果
#[inline]
pub fn record_merchant_identification(result: &str) {
    metrics::counter!(
        "merchant_identifications_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// 记录乐观锁冲突
#[inline]
pub fn record_summary_conflict(entity: &str) {
    metrics::counter!(
        "summary_update_conflicts_total",
        "entity" => entity.to_string()
    )
    .increment(1);
}

/// 记录缓存降级
#[inline]
pub fn record_cache_fallback(operation: &str) {
    metrics::counter!(
        "cache_fallbacks_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 记录死信流转：queued / redelivered / abandoned
#[inline]
pub fn record_dead_letter(stage: &str) {
    metrics::counter!("dead_letters_total", "stage" => stage.to_string()).increment(1);
}

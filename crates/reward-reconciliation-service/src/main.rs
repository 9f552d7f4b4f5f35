//! 订单奖励对账服务
//!
//! 消费订单生命周期消息完成奖励对账，并监听商户 / 促销变更维护缓存。

use std::sync::Arc;

use anyhow::{Context, Result};
use promo_shared::{
    cache::{Cache, CacheStore},
    config::AppConfig,
    database::Database,
    dlq::{DlqConsumer, DlqProducer},
    kafka::KafkaProducer,
    observability,
    retry::RetryPolicy,
};
use promotion_engine::{
    PromotionRulesEvaluator,
    merchant::{MerchantIdentificationService, MerchantRegexCacheManager},
    repository::{
        LedgerRepository, MerchantRegexRepository, MerchantRepository, PromotionRepository,
        PromotionSummaryRepository,
    },
};
use reward_reconciliation::{
    change_feed::ChangeFeedConsumer,
    consumer::TransactionConsumer,
    notification::KafkaNotificationSender,
    orchestrator::{OrchestratorSettings, ReconciliationOrchestrator},
    processor::TransactionProcessor,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "reward-reconciliation-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 配置文件缺失时使用默认值，内容无效则拒绝启动
    let config = AppConfig::load(SERVICE_NAME).context("加载配置失败")?;

    // 2. 可观测性
    let _guard = observability::init(&config.observability).await?;

    info!("Starting {}...", SERVICE_NAME);
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 数据库
    let db = Database::connect(&config.database).await?;
    let pool = db.pool().clone();

    // 4. Redis 缓存，不可用时读穿缓存会直接回源
    let cache = Arc::new(Cache::new(&config.redis)?);
    if let Err(e) = cache.health_check().await {
        warn!(error = %e, "Redis 健康检查失败，缓存将降级为直接回源");
    }
    let cache_store: Arc<dyn CacheStore> = cache.clone();

    // 5. 仓储
    let ledger_repo = Arc::new(LedgerRepository::new(pool.clone()));
    let promotion_repo = Arc::new(PromotionRepository::new(pool.clone()));
    let summary_repo = Arc::new(PromotionSummaryRepository::new(pool.clone()));
    let merchant_repo = Arc::new(MerchantRepository::new(pool.clone()));
    let regex_repo = Arc::new(MerchantRegexRepository::new(pool.clone()));
    info!("Repositories initialized");

    // 6. 商户识别与缓存预热
    let identifier = Arc::new(MerchantIdentificationService::new(
        cache_store.clone(),
        regex_repo.clone(),
        merchant_repo.clone(),
        &config.reconciliation,
    ));
    let cache_manager = Arc::new(MerchantRegexCacheManager::new(
        cache_store.clone(),
        regex_repo.clone(),
        config.reconciliation.cache_ttl(),
    ));
    let hydrated = cache_manager.hydrate().await;
    info!(merchants = hydrated, "Merchant regex cache hydrated");

    // 7. 对账编排
    let producer = KafkaProducer::new(&config.kafka)?;
    let evaluator = Arc::new(PromotionRulesEvaluator::new(summary_repo.clone()));
    let orchestrator = Arc::new(ReconciliationOrchestrator::new(
        ledger_repo,
        promotion_repo,
        summary_repo.clone(),
        identifier,
        evaluator,
        Arc::new(KafkaNotificationSender::new(producer.clone())),
        OrchestratorSettings::from(&config.reconciliation),
    ));
    info!("Reconciliation orchestrator initialized");

    // 8. 消费者
    let dlq_producer = DlqProducer::new(
        producer.clone(),
        SERVICE_NAME,
        RetryPolicy::for_messages(&config.reconciliation),
    );
    let transaction_consumer = TransactionConsumer::new(
        &config,
        TransactionProcessor::new(orchestrator),
        dlq_producer,
    )?;
    let change_consumer = ChangeFeedConsumer::new(&config, cache_manager, summary_repo)?;
    let dlq_consumer = DlqConsumer::new(&config, producer)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let transaction_task = tokio::spawn(transaction_consumer.run(shutdown_rx.clone()));
    let change_task = tokio::spawn(change_consumer.run(shutdown_rx.clone()));
    let dlq_task = tokio::spawn(dlq_consumer.run(shutdown_rx));
    info!("Consumers started");

    shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        warn!("All consumers already stopped");
    }

    for (name, task) in [("transaction", transaction_task), ("change-feed", change_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(consumer = name, error = %e, "Consumer exited with error"),
            Err(e) => error!(consumer = name, error = %e, "Consumer task panicked"),
        }
    }
    if let Err(e) = dlq_task.await {
        error!(error = %e, "DLQ consumer task panicked");
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}

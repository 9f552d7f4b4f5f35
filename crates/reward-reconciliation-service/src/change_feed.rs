//! 商户 / 促销变更消费者
//!
//! 收到变更通知后维护商户识别与优惠查询所用的缓存，
//! 并为新出现的促销补建空汇总，否则促销在规则评估中始终不合格。
//! 处理失败只记录日志，不影响后续消息。

use std::sync::Arc;

use promo_shared::config::AppConfig;
use promo_shared::error::PromoError;
use promo_shared::kafka::{ConsumerMessage, KafkaConsumer, topics};
use promotion_engine::merchant::MerchantRegexCacheManager;
use promotion_engine::models::{Merchant, Promotion, PromotionSummary};
use promotion_engine::repository::PromotionSummaryRepositoryTrait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{ReconciliationError, Result};

/// 变更通知消费者
pub struct ChangeFeedConsumer {
    consumer: KafkaConsumer,
    manager: Arc<MerchantRegexCacheManager>,
    summaries: Arc<dyn PromotionSummaryRepositoryTrait>,
}

impl ChangeFeedConsumer {
    /// 使用独立消费组，每个进程都能收到全部变更
    pub fn new(
        config: &AppConfig,
        manager: Arc<MerchantRegexCacheManager>,
        summaries: Arc<dyn PromotionSummaryRepositoryTrait>,
    ) -> std::result::Result<Self, PromoError> {
        let consumer = KafkaConsumer::new(&config.kafka, Some("changes"))?;
        Ok(Self {
            consumer,
            manager,
            summaries,
        })
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer
            .subscribe(&[topics::MERCHANT_CHANGES, topics::PROMOTION_CHANGES])?;
        info!("变更通知消费者已启动");

        let manager = self.manager;
        let summaries = self.summaries;
        self.consumer
            .start(shutdown, |msg| {
                let manager = &manager;
                let summaries = summaries.as_ref();
                async move {
                    if let Err(e) = handle_change_message(manager, summaries, &msg).await {
                        error!(
                            error = %e,
                            topic = %msg.topic,
                            offset = msg.offset,
                            "处理变更通知失败"
                        );
                    }
                    Ok::<(), PromoError>(())
                }
            })
            .await;

        info!("变更通知消费者已停止");
        Ok(())
    }
}

/// 按 topic 分派单条变更通知
pub async fn handle_change_message(
    manager: &MerchantRegexCacheManager,
    summaries: &dyn PromotionSummaryRepositoryTrait,
    msg: &ConsumerMessage,
) -> Result<()> {
    match msg.topic.as_str() {
        topics::MERCHANT_CHANGES => {
            let merchant: Merchant = parse(msg)?;
            manager.on_merchant_changed(&merchant).await?;
        }
        topics::PROMOTION_CHANGES => {
            let promotion: Promotion = parse(msg)?;
            manager.on_promotion_changed(&promotion).await;
            // 已有汇总时保持原计数
            summaries
                .create(&PromotionSummary::new(promotion.id.as_str()))
                .await?;
        }
        other => warn!(topic = other, "未知的变更通知 topic，忽略"),
    }
    Ok(())
}

fn parse<T: serde::de::DeserializeOwned>(msg: &ConsumerMessage) -> Result<T> {
    serde_json::from_slice(&msg.payload)
        .map_err(|e| ReconciliationError::MalformedMessage(e.to_string()))
}

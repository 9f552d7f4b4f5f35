//! 奖励余额变更通知
//!
//! 通过 `NotificationSender` trait 抽象发送行为，生产环境走 Kafka。

use async_trait::async_trait;
use promo_shared::error::PromoError;
use promo_shared::kafka::KafkaProducer;
use tracing::debug;

use crate::messages::{BalanceUpdateMessage, SUBJECT_HEADER};

/// 通知发送器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送余额变更通知到指定队列
    async fn send(&self, message: &BalanceUpdateMessage, queue_name: &str)
    -> Result<(), PromoError>;
}

// ---------------------------------------------------------------------------
// Kafka 发送器
// ---------------------------------------------------------------------------

/// 基于 Kafka 的通知发送器
///
/// 以订单 ID 作为消息 key，保证同一订单的通知有序；
/// 交易类型写入 `subject` 消息头，便于下游按类型路由。
pub struct KafkaNotificationSender {
    producer: KafkaProducer,
}

impl KafkaNotificationSender {
    pub fn new(producer: KafkaProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl NotificationSender for KafkaNotificationSender {
    async fn send(
        &self,
        message: &BalanceUpdateMessage,
        queue_name: &str,
    ) -> Result<(), PromoError> {
        let (partition, offset) = self
            .producer
            .send_json_with_headers(
                queue_name,
                &message.order_id,
                message,
                &[(SUBJECT_HEADER, message.transaction_type.as_str())],
            )
            .await?;

        debug!(
            order_id = %message.order_id,
            topic = queue_name,
            partition,
            offset,
            "余额变更通知已发送"
        );
        Ok(())
    }
}

//! Kafka 消费者
//!
//! 顺序消费交易 topic，可重试错误在进程内按退避策略重试，
//! 重试耗尽或不可重试的消息转入死信队列。

use promo_shared::config::AppConfig;
use promo_shared::dlq::DlqProducer;
use promo_shared::error::PromoError;
use promo_shared::kafka::{ConsumerMessage, KafkaConsumer, topics};
use promo_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{ReconciliationError, Result};
use crate::orchestrator::ReconciliationOutcome;
use crate::processor::TransactionProcessor;

/// 交易消息消费者
pub struct TransactionConsumer {
    consumer: KafkaConsumer,
    processor: TransactionProcessor,
    dlq: DlqProducer,
    retry_policy: RetryPolicy,
}

impl TransactionConsumer {
    pub fn new(
        config: &AppConfig,
        processor: TransactionProcessor,
        dlq: DlqProducer,
    ) -> std::result::Result<Self, PromoError> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        Ok(Self {
            consumer,
            processor,
            dlq,
            retry_policy: RetryPolicy::for_messages(&config.reconciliation),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[topics::TRANSACTION_EVENTS])?;
        info!(topic = topics::TRANSACTION_EVENTS, "交易消息消费者已启动");

        let processor = self.processor;
        let dlq = self.dlq;
        let policy = self.retry_policy;

        self.consumer
            .start(shutdown, |msg| {
                let processor = &processor;
                let dlq = &dlq;
                let policy = &policy;
                async move {
                    if let Err(e) = process_with_retry(processor, policy, &msg).await {
                        let retryable = e.is_retryable();
                        error!(
                            error = %e,
                            code = e.code(),
                            retryable,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            "交易消息处理失败，转入死信队列"
                        );
                        dlq.send_message_to_dlq(&msg, &e.to_string(), retryable)
                            .await?;
                    }
                    Ok::<(), PromoError>(())
                }
            })
            .await;

        info!("交易消息消费者已停止");
        Ok(())
    }
}

/// 带重试地处理单条消息
///
/// 只有可重试错误才会重试，输入类错误直接返回。
pub async fn process_with_retry(
    processor: &TransactionProcessor,
    policy: &RetryPolicy,
    msg: &ConsumerMessage,
) -> Result<ReconciliationOutcome> {
    retry_with_policy(
        policy,
        "reconcile_transaction",
        ReconciliationError::is_retryable,
        || processor.process(msg),
    )
    .await
}

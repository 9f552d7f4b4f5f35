//! 死信队列
//!
//! 交易消息在进程内重试耗尽或遇到不可重试的错误后写入死信 topic。
//! 死信消费者按退避时间把原消息连同原消息头发回来源 topic，
//! 重投次数达到上限的只记录错误日志，等待人工处理。

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::PromoError;
use crate::kafka::{ConsumerMessage, KafkaConsumer, KafkaProducer, topics};
use crate::observability::metrics::record_dead_letter;
use crate::retry::RetryPolicy;

/// 重投时写入的消息头，记录这是第几次重投
pub const RETRY_COUNT_HEADER: &str = "dlq-retry-count";

/// 死信记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message_id: String,
    pub source_topic: String,
    pub source_service: String,
    pub payload: String,
    /// 原消息头，不含重投计数
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub error: String,
    /// 不可重试的错误（如非法输入）只留档，不再重投
    #[serde(default = "default_retryable")]
    pub retryable: bool,
    pub redeliveries: u32,
    pub max_redeliveries: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    /// None 表示不再重投
    pub next_attempt_at: Option<DateTime<Utc>>,
}

fn default_retryable() -> bool {
    true
}

/// 死信消费者对一条记录的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 等待 `after` 后发回来源 topic
    Redeliver { after: Duration },
    Abandon,
}

impl DeadLetter {
    /// 记录一条处理失败的消息
    ///
    /// 已经是重投回来的消息沿用消息头中的计数，不会重置退避进度。
    /// `retryable` 为 false 时不安排重投。
    pub fn capture(
        msg: &ConsumerMessage,
        error: &str,
        retryable: bool,
        policy: &RetryPolicy,
        source_service: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let redeliveries = msg
            .header(RETRY_COUNT_HEADER)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        let next_attempt_at = (retryable && redeliveries < policy.max_retries).then(|| {
            now + chrono::Duration::from_std(policy.delay_for_attempt(redeliveries))
                .unwrap_or_default()
        });

        let mut headers = msg.headers.clone();
        headers.remove(RETRY_COUNT_HEADER);

        Self {
            message_id: msg.key.clone().unwrap_or_else(|| msg.position()),
            source_topic: msg.topic.clone(),
            source_service: source_service.to_string(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            headers,
            error: error.to_string(),
            retryable,
            redeliveries,
            max_redeliveries: policy.max_retries,
            first_failed_at: now,
            last_failed_at: now,
            next_attempt_at,
        }
    }

    pub fn disposition(&self, now: DateTime<Utc>) -> Disposition {
        match self.next_attempt_at {
            Some(at) if self.redeliveries < self.max_redeliveries => Disposition::Redeliver {
                after: (at - now).to_std().unwrap_or(Duration::ZERO),
            },
            _ => Disposition::Abandon,
        }
    }

    /// 重投时携带的消息头
    pub fn redelivery_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.push((
            RETRY_COUNT_HEADER.to_string(),
            (self.redeliveries + 1).to_string(),
        ));
        headers
    }
}

// ---------------------------------------------------------------------------
// DlqProducer
// ---------------------------------------------------------------------------

pub struct DlqProducer {
    producer: KafkaProducer,
    source_service: String,
    policy: RetryPolicy,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer, source_service: &str, policy: RetryPolicy) -> Self {
        Self {
            producer,
            source_service: source_service.to_string(),
            policy,
        }
    }

    /// 把消费到的消息转入死信队列
    pub async fn send_message_to_dlq(
        &self,
        msg: &ConsumerMessage,
        error: &str,
        retryable: bool,
    ) -> Result<(), PromoError> {
        let letter = DeadLetter::capture(
            msg,
            error,
            retryable,
            &self.policy,
            &self.source_service,
            Utc::now(),
        );

        self.producer
            .send_json(topics::DEAD_LETTER_QUEUE, &letter.message_id, &letter)
            .await?;

        record_dead_letter("queued");
        warn!(
            message_id = %letter.message_id,
            position = %msg.position(),
            redeliveries = letter.redeliveries,
            retryable,
            error,
            "消息已转入死信队列"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DlqConsumer
// ---------------------------------------------------------------------------

/// 死信消费者，独立的 `.dlq` 消费组
pub struct DlqConsumer {
    consumer: KafkaConsumer,
    producer: KafkaProducer,
}

impl DlqConsumer {
    pub fn new(config: &AppConfig, producer: KafkaProducer) -> Result<Self, PromoError> {
        let consumer = KafkaConsumer::new(&config.kafka, Some("dlq"))?;
        consumer.subscribe(&[topics::DEAD_LETTER_QUEUE])?;
        Ok(Self { consumer, producer })
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let producer = self.producer;
        self.consumer
            .start(shutdown, |msg| {
                let producer = &producer;
                async move { handle_dead_letter(&msg, producer).await }
            })
            .await;
        info!("死信消费循环已退出");
    }
}

/// 处理一条死信
///
/// 未到重投时间时在原地等待，死信消费是串行的，等待上限为退避上限。
async fn handle_dead_letter(
    msg: &ConsumerMessage,
    producer: &KafkaProducer,
) -> Result<(), PromoError> {
    let letter: DeadLetter = msg.deserialize_payload()?;

    match letter.disposition(Utc::now()) {
        Disposition::Redeliver { after } => {
            if !after.is_zero() {
                tokio::time::sleep(after).await;
            }

            let headers = letter.redelivery_headers();
            let header_refs: Vec<(&str, &str)> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            producer
                .send_with_headers(
                    &letter.source_topic,
                    &letter.message_id,
                    letter.payload.as_bytes(),
                    &header_refs,
                )
                .await?;

            record_dead_letter("redelivered");
            info!(
                message_id = %letter.message_id,
                source_topic = %letter.source_topic,
                redelivery = letter.redeliveries + 1,
                "死信已重投"
            );
        }
        Disposition::Abandon => {
            record_dead_letter("abandoned");
            error!(
                message_id = %letter.message_id,
                source_topic = %letter.source_topic,
                source_service = %letter.source_service,
                redeliveries = letter.redeliveries,
                first_failed_at = %letter.first_failed_at,
                retryable = letter.retryable,
                error = %letter.error,
                "死信不再重投，需人工处理"
            );
        }
    }
    Ok(())
}

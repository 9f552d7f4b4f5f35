//! Kafka 收发
//!
//! 交易事件、变更通知与死信都走同一套生产者/消费者封装。

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::PromoError;

pub mod topics {
    /// 订单生命周期事件：已创建、已退款、已结算
    pub const TRANSACTION_EVENTS: &str = "promotions.transactions";
    /// 余额变更通知的默认队列
    pub const BALANCE_UPDATES: &str = "promotions.balance.updates";
    pub const MERCHANT_CHANGES: &str = "promotions.merchant.changes";
    pub const PROMOTION_CHANGES: &str = "promotions.promotion.changes";
    pub const DEAD_LETTER_QUEUE: &str = "promotions.dlq";
}

fn kafka_error(context: &str, e: impl std::fmt::Display) -> PromoError {
    PromoError::Kafka(format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 脱离 rdkafka 生命周期的消息副本，可跨 await 传递
///
/// 非 UTF-8 的 key 和消息头会被丢弃。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let headers = msg
            .headers()
            .map(|h| {
                h.iter()
                    .filter_map(|header| {
                        let value = std::str::from_utf8(header.value?).ok()?;
                        Some((header.key.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .map(String::from),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// 解析 JSON 负载，失败映射为不可重试的验证错误
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, PromoError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| PromoError::Validation(format!("负载反序列化失败: {e}")))
    }

    /// 日志里定位消息用的坐标
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 生产者，克隆共享底层连接
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, PromoError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.delivery_timeout_ms.to_string())
            .create()
            .map_err(|e| kafka_error("创建生产者失败", e))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self {
            producer,
            delivery_timeout: Duration::from_millis(config.delivery_timeout_ms),
        })
    }

    /// 发送原始字节，返回 broker 确认的 (partition, offset)
    pub async fn send_with_headers(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(&str, &str)],
    ) -> Result<(i32, i64), PromoError> {
        let owned_headers = headers
            .iter()
            .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (name, value)| {
                acc.insert(Header {
                    key: name,
                    value: Some(*value),
                })
            });

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(owned_headers);

        let delivery = self
            .producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(e, _)| kafka_error("发送消息失败", e))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已确认"
        );
        Ok((delivery.partition, delivery.offset))
    }

    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), PromoError> {
        self.send_json_with_headers(topic, key, value, &[]).await
    }

    pub async fn send_json_with_headers<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
        headers: &[(&str, &str)],
    ) -> Result<(i32, i64), PromoError> {
        let payload = serde_json::to_vec(value)?;
        self.send_with_headers(topic, key, &payload, headers).await
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// `group_suffix` 让同一服务的不同消费循环各自占一个消费组，
    /// 如 `promotions-engine.changes`
    pub fn new(config: &KafkaConfig, group_suffix: Option<&str>) -> Result<Self, PromoError> {
        let group_id = group_suffix.map_or_else(
            || config.consumer_group.clone(),
            |suffix| format!("{}.{}", config.consumer_group, suffix),
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| kafka_error("创建消费者失败", e))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), PromoError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| kafka_error("订阅失败", e))?;
        info!(?topics, "已订阅");
        Ok(())
    }

    /// 逐条处理消息直到关闭信号置为 true
    ///
    /// 消息串行处理，当前消息处理完才会检查关闭信号。
    /// handler 的错误只记日志，失败消息的去向由 handler 自己决定。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: Future<Output = Result<(), PromoError>>,
    {
        let stream = self.consumer.stream();
        futures::pin_mut!(stream);
        info!("Kafka 消费循环已启动");

        loop {
            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到关闭信号，消费循环退出");
                        break;
                    }
                    continue;
                }
                next = stream.next() => next,
            };

            let msg = match next {
                Some(Ok(borrowed)) => ConsumerMessage::from_borrowed(&borrowed),
                Some(Err(e)) => {
                    error!(error = %e, "拉取消息失败");
                    continue;
                }
                None => {
                    warn!("消息流已结束");
                    break;
                }
            };

            let position = msg.position();
            debug!(position = %position, "收到消息");
            if let Err(e) = handler(msg).await {
                error!(position = %position, error = %e, "消息处理失败");
            }
        }
    }
}

//! 基础设施错误
//!
//! 存储、缓存、Kafka 与序列化故障。领域 crate 通过 `#[from]` 包装本类型。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromoError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 条件写入时版本号已变化，调用方重新读取后再写
    #[error("并发写冲突: {entity} id={id}, expected_version={expected_version}")]
    ConcurrencyConflict {
        entity: String,
        id: String,
        expected_version: i64,
    },

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 消息或参数本身有问题，重试无意义
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PromoError>;

impl PromoError {
    /// 指标与日志中使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::Kafka(_) | Self::ConcurrencyConflict { .. }
        )
    }
}

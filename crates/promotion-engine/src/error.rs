//! 促销引擎错误类型
//!
//! 定义领域层的业务错误，基础设施错误通过 `Shared` 透传

use promo_shared::error::PromoError;
use thiserror::Error;

/// 促销引擎错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    /// 流程中途需要的领域对象缺失（促销、汇总），交由投递层重试
    #[error("领域对象不存在: {entity} id={id}")]
    DomainObjectNotFound { entity: &'static str, id: String },

    #[error("无法识别的交易类型: order_id={order_id}")]
    UnknownTransactionType { order_id: String },

    #[error("并发冲突，重试次数已耗尽: {entity} id={id}")]
    ConcurrencyConflict { entity: &'static str, id: String },

    #[error(transparent)]
    Shared(#[from] PromoError),
}

/// 促销引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Shared(PromoError::Database(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Shared(PromoError::Serialization(err))
    }
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::DomainObjectNotFound {
            entity,
            id: id.into(),
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DomainObjectNotFound { .. } | Self::ConcurrencyConflict { .. } => true,
            Self::UnknownTransactionType { .. } => false,
            Self::Shared(e) => e.is_retryable(),
        }
    }

    /// 是否为乐观锁版本冲突（单次写入）
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::Shared(PromoError::ConcurrencyConflict { .. }))
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DomainObjectNotFound { .. } => "DOMAIN_OBJECT_NOT_FOUND",
            Self::UnknownTransactionType { .. } => "UNKNOWN_TRANSACTION_TYPE",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Shared(e) => e.code(),
        }
    }
}

//! 对账服务专用错误类型
//!
//! 在领域错误与共享库错误之上，增加消息解码与商户识别相关的变体。

use promo_shared::error::PromoError;
use promotion_engine::EngineError;

/// 对账处理错误
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    /// 通用交易消息的类型为空、无法识别或不受支持
    #[error("无效的交易类型: {transaction_type}")]
    InvalidTransactionType { transaction_type: String },

    /// 订单创建时无法通过商户名称识别出商户
    #[error("无法识别商户: order_id={order_id}, merchant_name={merchant_name}")]
    MerchantNotFound {
        order_id: String,
        merchant_name: String,
    },

    #[error("消息格式错误: {0}")]
    MalformedMessage(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Shared(#[from] PromoError),
}

pub type Result<T> = std::result::Result<T, ReconciliationError>;

impl ReconciliationError {
    /// 输入类错误重试也不会成功
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidTransactionType { .. }
            | Self::MerchantNotFound { .. }
            | Self::MalformedMessage(_) => false,
            Self::Engine(e) => e.is_retryable(),
            Self::Shared(e) => e.is_retryable(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransactionType { .. } => "INVALID_TRANSACTION_TYPE",
            Self::MerchantNotFound { .. } => "MERCHANT_NOT_FOUND",
            Self::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Self::Engine(e) => e.error_code(),
            Self::Shared(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconciliationError::InvalidTransactionType {
            transaction_type: "Bogus".to_string(),
        };
        assert_eq!(err.to_string(), "无效的交易类型: Bogus");

        let err = ReconciliationError::MerchantNotFound {
            order_id: "o-1".to_string(),
            merchant_name: "ACME".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "无法识别商户: order_id=o-1, merchant_name=ACME"
        );

        let err = ReconciliationError::Shared(PromoError::Kafka("broker 不可达".to_string()));
        assert_eq!(err.to_string(), PromoError::Kafka("broker 不可达".to_string()).to_string());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!ReconciliationError::MalformedMessage("x".to_string()).is_retryable());
        assert!(
            !ReconciliationError::MerchantNotFound {
                order_id: "o-1".to_string(),
                merchant_name: "x".to_string(),
            }
            .is_retryable()
        );
        assert!(
            ReconciliationError::Engine(EngineError::not_found("PromotionSummary", "p-1"))
                .is_retryable()
        );
        assert!(
            !ReconciliationError::Shared(PromoError::Validation("bad".to_string())).is_retryable()
        );
    }

    #[test]
    fn test_error_codes_pass_through() {
        assert_eq!(
            ReconciliationError::MalformedMessage("x".to_string()).code(),
            "MALFORMED_MESSAGE"
        );
        assert_eq!(
            ReconciliationError::Engine(EngineError::ConcurrencyConflict {
                entity: "PromotionSummary",
                id: "p-1".to_string(),
            })
            .code(),
            "CONCURRENCY_CONFLICT"
        );
        assert_eq!(
            ReconciliationError::Shared(PromoError::Kafka("x".to_string())).code(),
            "KAFKA_ERROR"
        );
    }
}

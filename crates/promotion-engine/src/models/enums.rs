//! 促销领域枚举类型定义
//!
//! 所有枚举都是封闭集合，通过 `match` 分派；支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 奖励费率类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateType {
    /// 固定金额 - 奖励与订单金额无关
    Fixed,
    /// 百分比 - 按订单金额比例计算
    Percentage,
}

/// 促销类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionType {
    /// 返现
    CashBack,
    /// 折扣
    Discount,
}

impl PromotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashBack => "CashBack",
            Self::Discount => "Discount",
        }
    }
}

/// 奖励交易类型
///
/// 账本中每条交易记录的类型，决定其对订单金额的影响方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// 订单创建（+）
    #[serde(rename = "OrderCreated")]
    Created,
    /// 订单金额增加（+），只参与订单金额重算
    #[serde(rename = "OrderAmountIncreased")]
    AmountIncreased,
    /// 订单退款（-）
    #[serde(rename = "OrderRefunded")]
    Refunded,
    /// 订单结算（0）
    #[serde(rename = "OrderSettled")]
    Settled,
    /// 无法识别的类型，参与金额重算时报错
    #[serde(other)]
    Unknown,
}

impl TransactionType {
    /// 对外消息中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "OrderCreated",
            Self::AmountIncreased => "OrderAmountIncreased",
            Self::Refunded => "OrderRefunded",
            Self::Settled => "OrderSettled",
            Self::Unknown => "Unknown",
        }
    }

    /// 按名称解析，空白或无法识别的名称解析为 Unknown
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "OrderCreated" => Self::Created,
            "OrderAmountIncreased" => Self::AmountIncreased,
            "OrderRefunded" => Self::Refunded,
            "OrderSettled" => Self::Settled,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规则评估上下文
///
/// 标识发起资格评估的流程，决定适用哪一组规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationContext {
    /// 订单创建时发放奖励
    OrderCreated,
    /// 退款后重新评估，只检查最低金额
    OrderRefunded,
    /// 收银台展示优惠
    CheckoutPresentation,
    /// App 内展示优惠
    AppPresentation,
}

impl EvaluationContext {
    pub fn is_refund(&self) -> bool {
        matches!(self, Self::OrderRefunded)
    }
}

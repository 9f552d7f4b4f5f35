//! 订单生命周期命令
//!
//! 入站消息解码后的统一表示，与传输格式无关。

use promotion_engine::models::TransactionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 订单创建
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedCommand {
    pub order_id: String,
    pub customer_id: String,
    pub external_merchant_id: String,
    pub authorization_id: String,
    /// 授权时的商户名称，用于正则识别商户
    pub merchant_name: String,
    pub order_amount: Decimal,
}

/// 订单退款
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRefundedCommand {
    pub transaction_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub external_merchant_id: String,
    pub amount: Decimal,
    pub currency_code: String,
}

/// 单个商户的结算明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantTransactionDetail {
    #[serde(default)]
    pub merchant_name: String,
    #[serde(default)]
    pub total_gateway_captured: Decimal,
    #[serde(default)]
    pub total_gateway_refunded: Decimal,
}

/// 订单结算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettledCommand {
    pub order_id: String,
    pub transaction_details: Vec<MerchantTransactionDetail>,
}

/// 订单生命周期命令
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    Created(OrderCreatedCommand),
    Refunded(OrderRefundedCommand),
    Settled(OrderSettledCommand),
}

impl LifecycleCommand {
    pub fn order_id(&self) -> &str {
        match self {
            Self::Created(cmd) => &cmd.order_id,
            Self::Refunded(cmd) => &cmd.order_id,
            Self::Settled(cmd) => &cmd.order_id,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Created(_) => TransactionType::Created,
            Self::Refunded(_) => TransactionType::Refunded,
            Self::Settled(_) => TransactionType::Settled,
        }
    }
}

impl From<OrderCreatedCommand> for LifecycleCommand {
    fn from(cmd: OrderCreatedCommand) -> Self {
        Self::Created(cmd)
    }
}

impl From<OrderRefundedCommand> for LifecycleCommand {
    fn from(cmd: OrderRefundedCommand) -> Self {
        Self::Refunded(cmd)
    }
}

impl From<OrderSettledCommand> for LifecycleCommand {
    fn from(cmd: OrderSettledCommand) -> Self {
        Self::Settled(cmd)
    }
}

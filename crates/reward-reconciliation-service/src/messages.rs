//! 消息格式
//!
//! 交易 topic 上的入站消息有两类：
//! - 账务系统发布的 PurchaseLedger 事件，通过 `subject` 消息头区分
//! - 不带（或带其他）`subject` 的通用交易消息，按 `transactionType` 字段区分
//!
//! 出站的奖励余额变更通知也定义在这里。

use promo_shared::kafka::ConsumerMessage;
use promotion_engine::models::TransactionType;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::commands::{
    LifecycleCommand, MerchantTransactionDetail, OrderCreatedCommand, OrderRefundedCommand,
    OrderSettledCommand,
};
use crate::error::{ReconciliationError, Result};

/// 消息类型头
pub const SUBJECT_HEADER: &str = "subject";

pub mod subjects {
    pub const ORDER_CREATED: &str = "PurchaseLedgerOrderCreated";
    pub const ORDER_REFUNDED: &str = "PurchaseLedgerOrderRefunded";
    pub const SETTLED: &str = "PurchaseLedgerSettled";
}

// ==================== 入站消息 ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLedgerOrderCreated {
    pub order_id: String,
    pub customer_id: String,
    pub merchant_id: String,
    #[serde(default)]
    pub authorization_id: String,
    #[serde(default)]
    pub authorization_merchant_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLedgerOrderRefunded {
    pub order_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    pub transaction_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLedgerSettled {
    /// 账务 ID 即订单 ID
    pub purchase_id: String,
    #[serde(default)]
    pub transaction_details: Option<Vec<MerchantTransactionDetail>>,
}

/// 通用交易消息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionMessage {
    pub transaction_type: String,
    pub order_id: String,
    pub authorization_id: String,
    /// 外部商户 ID
    pub merchant_id: String,
    pub merchant_name: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub customer_id: String,
    pub transaction_id: String,
    pub transaction_details: Vec<MerchantTransactionDetail>,
}

impl From<PurchaseLedgerOrderCreated> for OrderCreatedCommand {
    fn from(msg: PurchaseLedgerOrderCreated) -> Self {
        Self {
            order_id: msg.order_id,
            customer_id: msg.customer_id,
            external_merchant_id: msg.merchant_id,
            authorization_id: msg.authorization_id,
            merchant_name: msg.authorization_merchant_name,
            order_amount: msg.amount,
        }
    }
}

impl From<PurchaseLedgerOrderRefunded> for OrderRefundedCommand {
    fn from(msg: PurchaseLedgerOrderRefunded) -> Self {
        Self {
            transaction_id: msg.transaction_id,
            order_id: msg.order_id,
            customer_id: msg.customer_id.unwrap_or_default(),
            external_merchant_id: msg.merchant_id.unwrap_or_default(),
            amount: msg.amount,
            currency_code: msg.currency,
        }
    }
}

impl From<PurchaseLedgerSettled> for OrderSettledCommand {
    fn from(msg: PurchaseLedgerSettled) -> Self {
        Self {
            order_id: msg.purchase_id,
            transaction_details: msg.transaction_details.unwrap_or_default(),
        }
    }
}

impl TryFrom<TransactionMessage> for LifecycleCommand {
    type Error = ReconciliationError;

    fn try_from(msg: TransactionMessage) -> Result<Self> {
        match TransactionType::parse(&msg.transaction_type) {
            TransactionType::Created => Ok(Self::Created(OrderCreatedCommand {
                order_id: msg.order_id,
                customer_id: msg.customer_id,
                external_merchant_id: msg.merchant_id,
                authorization_id: msg.authorization_id,
                merchant_name: msg.merchant_name,
                order_amount: msg.amount,
            })),
            TransactionType::Refunded => Ok(Self::Refunded(OrderRefundedCommand {
                transaction_id: msg.transaction_id,
                order_id: msg.order_id,
                customer_id: msg.customer_id,
                external_merchant_id: msg.merchant_id,
                amount: msg.amount,
                currency_code: msg.currency_code,
            })),
            TransactionType::Settled => Ok(Self::Settled(OrderSettledCommand {
                order_id: msg.order_id,
                transaction_details: msg.transaction_details,
            })),
            TransactionType::AmountIncreased | TransactionType::Unknown => {
                Err(ReconciliationError::InvalidTransactionType {
                    transaction_type: msg.transaction_type,
                })
            }
        }
    }
}

fn parse_payload<T: DeserializeOwned>(msg: &ConsumerMessage) -> Result<T> {
    serde_json::from_slice(&msg.payload)
        .map_err(|e| ReconciliationError::MalformedMessage(e.to_string()))
}

/// 将交易 topic 上的消息解码为生命周期命令
pub fn decode_command(msg: &ConsumerMessage) -> Result<LifecycleCommand> {
    match msg.header(SUBJECT_HEADER) {
        Some(subjects::ORDER_CREATED) => {
            Ok(OrderCreatedCommand::from(parse_payload::<PurchaseLedgerOrderCreated>(msg)?).into())
        }
        Some(subjects::ORDER_REFUNDED) => Ok(OrderRefundedCommand::from(
            parse_payload::<PurchaseLedgerOrderRefunded>(msg)?,
        )
        .into()),
        Some(subjects::SETTLED) => {
            Ok(OrderSettledCommand::from(parse_payload::<PurchaseLedgerSettled>(msg)?).into())
        }
        _ => LifecycleCommand::try_from(parse_payload::<TransactionMessage>(msg)?),
    }
}

// ==================== 出站消息 ====================

/// 奖励余额变更通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdateMessage {
    /// 本次事件带来的余额变动
    pub reward_amount: Decimal,
    pub order_id: String,
    pub customer_id: String,
    pub transaction_type: TransactionType,
}

impl BalanceUpdateMessage {
    pub fn created(reward_amount: Decimal, order_id: &str, customer_id: &str) -> Self {
        Self::new(reward_amount, order_id, customer_id, TransactionType::Created)
    }

    pub fn refunded(reward_amount: Decimal, order_id: &str, customer_id: &str) -> Self {
        Self::new(reward_amount, order_id, customer_id, TransactionType::Refunded)
    }

    pub fn settled(reward_amount: Decimal, order_id: &str, customer_id: &str) -> Self {
        Self::new(reward_amount, order_id, customer_id, TransactionType::Settled)
    }

    fn new(
        reward_amount: Decimal,
        order_id: &str,
        customer_id: &str,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            reward_amount,
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            transaction_type,
        }
    }
}

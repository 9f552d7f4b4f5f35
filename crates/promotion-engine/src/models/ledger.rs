//! 客户订单奖励账本
//!
//! 每个订单一本账，记录奖励交易流水和当前余额。
//! 交易只追加不修改，回放 `reward_amount` 即可还原余额。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::enums::TransactionType;
use super::merchant::Merchant;
use super::promotion::{Promotion, SummaryDelta};
use crate::error::{EngineError, Result};

/// 奖励交易记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardTransaction {
    pub transaction_type: TransactionType,
    /// 本次事件变动的订单金额（创建为订单金额，退款为退款金额，结算为 0）
    pub amount: Decimal,
    /// 本次事件对奖励余额的带符号影响
    pub reward_amount: Decimal,
    #[serde(default)]
    pub authorization_id: Option<String>,
    pub order_id: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    /// 退款交易 ID，同一订单内唯一
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RewardTransaction {
    /// 订单创建交易
    pub fn created(
        order_id: &str,
        order_amount: Decimal,
        reward: Decimal,
        authorization_id: &str,
        merchant: &Merchant,
    ) -> Self {
        Self {
            transaction_type: TransactionType::Created,
            amount: order_amount,
            reward_amount: reward,
            authorization_id: Some(authorization_id.to_string()),
            order_id: order_id.to_string(),
            merchant_name: Some(merchant.merchant_name.clone()),
            merchant_id: Some(merchant.merchant_id.clone()),
            transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// 订单退款交易，`reward_amount` 在算出差额后再回填
    pub fn refunded(order_id: &str, transaction_id: &str, refund_amount: Decimal) -> Self {
        Self {
            transaction_type: TransactionType::Refunded,
            amount: refund_amount,
            reward_amount: Decimal::ZERO,
            authorization_id: None,
            order_id: order_id.to_string(),
            merchant_name: None,
            merchant_id: None,
            transaction_id: Some(transaction_id.to_string()),
            created_at: Utc::now(),
        }
    }

    /// 订单结算交易
    pub fn settled(order_id: &str, reward_adjustment: Decimal) -> Self {
        Self {
            transaction_type: TransactionType::Settled,
            amount: Decimal::ZERO,
            reward_amount: reward_adjustment,
            authorization_id: None,
            order_id: order_id.to_string(),
            merchant_name: None,
            merchant_id: None,
            transaction_id: None,
            created_at: Utc::now(),
        }
    }
}

/// 促销客户名单的变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerChange {
    Add,
    Remove,
}

/// 账本交易已落盘但尚未完成的聚合写入
///
/// 与交易一起写入账本，重放时据此补齐汇总与促销，
/// 每完成一步就清除对应字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrites {
    #[serde(default)]
    pub summary: Option<SummaryDelta>,
    #[serde(default)]
    pub customer: Option<CustomerChange>,
}

impl PendingWrites {
    pub fn new(summary: SummaryDelta, customer: CustomerChange) -> Self {
        Self {
            summary: Some(summary),
            customer: Some(customer),
        }
    }

    /// 只调整汇总金额，不变更客户名单
    pub fn summary_only(summary: SummaryDelta) -> Self {
        Self {
            summary: Some(summary),
            customer: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.customer.is_none()
    }
}

/// 客户订单奖励账本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrderRewardsLedger {
    pub order_id: String,
    pub customer_id: String,
    /// 订单创建时识别出的商户
    #[sqlx(json)]
    pub merchant: Merchant,
    /// 订单创建时选定的促销，之后不再更换
    #[sqlx(json)]
    pub promotion: Promotion,
    pub reward_balance: Decimal,
    #[sqlx(json)]
    pub transactions: Vec<RewardTransaction>,
    /// 最近一笔交易尚未完成的汇总 / 促销写入
    #[sqlx(json)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingWrites>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl CustomerOrderRewardsLedger {
    /// 以一条创建交易开账，余额即为奖励金额
    pub fn open(
        customer_id: &str,
        merchant: Merchant,
        promotion: Promotion,
        created: RewardTransaction,
    ) -> Self {
        Self {
            order_id: created.order_id.clone(),
            customer_id: customer_id.to_string(),
            merchant,
            promotion,
            reward_balance: created.reward_amount,
            transactions: vec![created],
            pending: None,
            created_at: Utc::now(),
            modified_at: None,
        }
    }

    /// 幂等检查：是否已存在指定类型（及交易 ID）的交易
    ///
    /// `transaction_id` 为 None 时只按类型判断。
    pub fn has_transaction(&self, kind: TransactionType, transaction_id: Option<&str>) -> bool {
        self.transactions.iter().any(|tx| {
            tx.transaction_type == kind
                && transaction_id.is_none_or(|id| tx.transaction_id.as_deref() == Some(id))
        })
    }

    pub fn append(&mut self, transaction: RewardTransaction) {
        self.transactions.push(transaction);
        self.modified_at = Some(Utc::now());
    }

    pub fn last_transaction(&self) -> Option<&RewardTransaction> {
        self.transactions.last()
    }

    /// 清除已完成的写入，全部完成后置空
    pub fn clear_pending(&mut self, step: impl FnOnce(&mut PendingWrites)) {
        if let Some(pending) = self.pending.as_mut() {
            step(pending);
            if pending.is_empty() {
                self.pending = None;
            }
        }
    }

    /// 根据完整流水重算当前订单金额
    ///
    /// 结果为负时截断为 0 并记录告警。
    pub fn current_order_amount(&self) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for tx in &self.transactions {
            match tx.transaction_type {
                TransactionType::Created | TransactionType::AmountIncreased => total += tx.amount,
                TransactionType::Refunded => total -= tx.amount,
                TransactionType::Settled => {}
                TransactionType::Unknown => {
                    return Err(EngineError::UnknownTransactionType {
                        order_id: self.order_id.clone(),
                    });
                }
            }
        }

        if total < Decimal::ZERO {
            warn!(
                order_id = %self.order_id,
                computed = %total,
                "订单金额计算为负数，截断为 0"
            );
            return Ok(Decimal::ZERO);
        }
        Ok(total)
    }

    /// 回放流水得到的奖励余额
    pub fn replayed_balance(&self) -> Decimal {
        self.transactions.iter().map(|tx| tx.reward_amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{merchant, promotion};
    use rust_decimal_macros::dec;

    fn ledger_with(order_amount: Decimal, reward: Decimal) -> CustomerOrderRewardsLedger {
        let merchant = merchant("m-1", "ACME");
        let created =
            RewardTransaction::created("o-1", order_amount, reward, "auth-1", &merchant);
        CustomerOrderRewardsLedger::open("c-1", merchant, promotion("p-1", "m-1"), created)
    }

    #[test]
    fn test_open_sets_balance_to_reward() {
        let ledger = ledger_with(dec!(100), dec!(5));
        assert_eq!(ledger.order_id, "o-1");
        assert_eq!(ledger.reward_balance, dec!(5));
        assert_eq!(ledger.replayed_balance(), dec!(5));
    }

    #[test]
    fn test_has_transaction_by_kind_and_id() {
        let mut ledger = ledger_with(dec!(100), dec!(5));
        ledger.append(RewardTransaction::refunded("o-1", "t-1", dec!(10)));

        assert!(ledger.has_transaction(TransactionType::Created, None));
        assert!(ledger.has_transaction(TransactionType::Refunded, Some("t-1")));
        assert!(!ledger.has_transaction(TransactionType::Refunded, Some("t-2")));
        assert!(!ledger.has_transaction(TransactionType::Settled, None));
    }

    #[test]
    fn test_current_order_amount() {
        let mut ledger = ledger_with(dec!(100), dec!(5));
        ledger.append(RewardTransaction {
            transaction_type: TransactionType::AmountIncreased,
            amount: dec!(20),
            ..RewardTransaction::settled("o-1", Decimal::ZERO)
        });
        ledger.append(RewardTransaction::refunded("o-1", "t-1", dec!(30)));
        ledger.append(RewardTransaction::settled("o-1", Decimal::ZERO));

        assert_eq!(ledger.current_order_amount().unwrap(), dec!(90));
    }

    #[test]
    fn test_current_order_amount_clamped_at_zero() {
        let mut ledger = ledger_with(dec!(50), dec!(5));
        ledger.append(RewardTransaction::refunded("o-1", "t-1", dec!(80)));
        assert_eq!(ledger.current_order_amount().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_current_order_amount_rejects_unknown() {
        let mut ledger = ledger_with(dec!(50), dec!(5));
        ledger.append(RewardTransaction {
            transaction_type: TransactionType::Unknown,
            ..RewardTransaction::settled("o-1", Decimal::ZERO)
        });

        let err = ledger.current_order_amount().unwrap_err();
        assert!(matches!(err, EngineError::UnknownTransactionType { .. }));
    }

    #[test]
    fn test_clear_pending_step_by_step() {
        let mut ledger = ledger_with(dec!(100), dec!(5));
        ledger.pending = Some(PendingWrites::new(
            SummaryDelta::redeemed(dec!(5)),
            CustomerChange::Add,
        ));

        ledger.clear_pending(|p| p.summary = None);
        assert_eq!(
            ledger.pending.as_ref().and_then(|p| p.customer),
            Some(CustomerChange::Add)
        );

        ledger.clear_pending(|p| p.customer = None);
        assert!(ledger.pending.is_none());
    }

    #[test]
    fn test_pending_round_trips_through_json() {
        let mut ledger = ledger_with(dec!(100), dec!(5));
        assert!(serde_json::to_value(&ledger).unwrap().get("pending").is_none());

        ledger.pending = Some(PendingWrites::new(
            SummaryDelta::disqualified(dec!(-5)),
            CustomerChange::Remove,
        ));
        let json = serde_json::to_string(&ledger).unwrap();
        let back: CustomerOrderRewardsLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pending, ledger.pending);
    }

    #[test]
    fn test_transactions_serialize_as_json_array() {
        let ledger = ledger_with(dec!(100), dec!(5));
        let json = serde_json::to_value(&ledger.transactions).unwrap();
        assert_eq!(json[0]["transactionType"], "OrderCreated");
        assert_eq!(json[0]["authorizationId"], "auth-1");
    }
}

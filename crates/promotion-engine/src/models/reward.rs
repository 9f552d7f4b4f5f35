//! 奖励计算结果

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 一次奖励计算的结果，不单独持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub amount: Decimal,
    pub order_id: String,
    pub customer_id: String,
    pub promotion_id: String,
}

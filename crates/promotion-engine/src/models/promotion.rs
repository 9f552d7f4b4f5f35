//! 促销及其汇总实体定义

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{PromotionType, RateType};

/// 促销规则
///
/// 挂在促销上的声明式上限，评估时只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRules {
    /// 促销总共可被兑现的次数
    #[serde(default)]
    pub number_of_times_redeemable: Option<i64>,
    /// 订单的最低合格金额
    #[serde(default)]
    pub minimum_transaction_amount: Decimal,
    /// 单笔订单的最高合格金额
    #[serde(default)]
    pub maximum_transaction_amount: Option<Decimal>,
    /// 促销可发放的奖励总额
    #[serde(default)]
    pub total_rewards_amount: Option<Decimal>,
    /// 每个客户可兑现的次数
    #[serde(default = "default_redemptions_per_customer")]
    pub number_of_redemptions_per_customer: i64,
    /// 可参与的客户总数
    #[serde(default)]
    pub total_number_of_customers: Option<i64>,
}

fn default_redemptions_per_customer() -> i64 {
    1
}

impl Default for PromotionRules {
    fn default() -> Self {
        Self {
            number_of_times_redeemable: None,
            minimum_transaction_amount: Decimal::ZERO,
            maximum_transaction_amount: None,
            total_rewards_amount: None,
            number_of_redemptions_per_customer: default_redemptions_per_customer(),
            total_number_of_customers: None,
        }
    }
}

/// 促销定义
///
/// 商户维度的优惠，只做逻辑删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: String,
    /// 所属商户 ID
    pub merchant_id: String,
    pub promotion_name: String,
    #[sqlx(json)]
    pub promotion_rules: PromotionRules,
    #[sqlx(default)]
    pub promotion_type: Option<PromotionType>,
    pub promotion_description: String,
    pub promotion_start_date: DateTime<Utc>,
    pub promotion_end_date: DateTime<Utc>,
    pub reward_rate_type: RateType,
    pub rate_amount: Decimal,
    pub active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// 已兑现该促销的客户（允许重复，出现次数即兑现次数）
    pub customer_ids: Vec<String>,
    /// 乐观锁版本号
    pub version: i64,
}

impl Promotion {
    /// 客户已兑现该促销的次数
    pub fn redemption_count(&self, customer_id: &str) -> usize {
        self.customer_ids
            .iter()
            .filter(|id| id.as_str() == customer_id)
            .count()
    }

    pub fn add_customer(&mut self, customer_id: &str) {
        self.customer_ids.push(customer_id.to_string());
    }

    /// 移除一次客户兑现记录，返回是否存在
    pub fn remove_customer(&mut self, customer_id: &str) -> bool {
        match self.customer_ids.iter().position(|id| id == customer_id) {
            Some(idx) => {
                self.customer_ids.remove(idx);
                true
            }
            None => false,
        }
    }
}

/// 促销汇总
///
/// 与促销分开存储的聚合计数，读写频率远高于促销本身
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSummary {
    pub promotion_id: String,
    pub number_of_times_redeemed: i64,
    pub total_amount_redeemed: Decimal,
    pub total_number_of_customers: i64,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// 乐观锁版本号
    pub version: i64,
}

impl PromotionSummary {
    pub fn new(promotion_id: impl Into<String>) -> Self {
        Self {
            promotion_id: promotion_id.into(),
            number_of_times_redeemed: 0,
            total_amount_redeemed: Decimal::ZERO,
            total_number_of_customers: 0,
            created_at: Utc::now(),
            modified_at: None,
            version: 0,
        }
    }

    /// 应用一次增量调整
    pub fn apply(&mut self, delta: &SummaryDelta) {
        self.number_of_times_redeemed += delta.times_redeemed;
        self.total_amount_redeemed += delta.amount_redeemed;
        self.total_number_of_customers += delta.customers;
        self.modified_at = Some(Utc::now());
    }
}

/// 汇总计数的增量
///
/// 汇总只通过增量维护，冲突重试时对最新版本重新应用同一增量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDelta {
    pub times_redeemed: i64,
    pub amount_redeemed: Decimal,
    pub customers: i64,
}

impl SummaryDelta {
    /// 一次新的兑现：+1 / +reward / +1
    pub fn redeemed(reward: Decimal) -> Self {
        Self {
            times_redeemed: 1,
            amount_redeemed: reward,
            customers: 1,
        }
    }

    /// 完全取消资格：-1 / amount / -1
    pub fn disqualified(amount: Decimal) -> Self {
        Self {
            times_redeemed: -1,
            amount_redeemed: amount,
            customers: -1,
        }
    }

    /// 只调整金额
    pub fn amount_only(amount: Decimal) -> Self {
        Self {
            times_redeemed: 0,
            amount_redeemed: amount,
            customers: 0,
        }
    }
}

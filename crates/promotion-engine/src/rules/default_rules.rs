//! 默认规则
//!
//! 不依赖汇总数据的资格检查：生效状态、日期窗口、金额区间、单客户兑现次数

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{EvaluationContext, Promotion};

/// 评估默认规则
///
/// 非退款上下文按顺序检查：
/// 1. 促销未生效则不合格
/// 2. 今天（UTC 日期）不在促销起止日期内则不合格，忽略时分秒
/// 3. 订单金额低于最低金额则不合格
/// 4. 设置了最高金额时，结果即为 `订单金额 <= 最高金额`，不再检查单客户次数
/// 5. 提供了非空客户 ID 时，客户已兑现次数必须小于单客户上限
///
/// 退款上下文只检查最低金额，已过期或已下线的促销仍可退款。
pub fn evaluate_default_rules(
    promotion: &Promotion,
    order_amount: Decimal,
    context: EvaluationContext,
    customer_id: Option<&str>,
    today: NaiveDate,
) -> bool {
    let rules = &promotion.promotion_rules;

    if context.is_refund() {
        return rules.minimum_transaction_amount <= order_amount;
    }

    if !promotion.active {
        return false;
    }

    if promotion.promotion_start_date.date_naive() > today
        || promotion.promotion_end_date.date_naive() < today
    {
        return false;
    }

    if order_amount < rules.minimum_transaction_amount {
        return false;
    }

    if let Some(max) = rules.maximum_transaction_amount {
        return max >= order_amount;
    }

    match customer_id {
        Some(customer_id) if !customer_id.is_empty() => {
            (promotion.redemption_count(customer_id) as i64)
                < rules.number_of_redemptions_per_customer
        }
        _ => true,
    }
}

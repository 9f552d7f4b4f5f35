//! 汇总规则
//!
//! 基于促销汇总计数的总量上限检查

use crate::models::{EvaluationContext, Promotion, PromotionSummary};

/// 评估汇总规则
///
/// 任一已设置的总量上限被用满即不合格；退款上下文总是合格。
pub fn evaluate_summary_rules(
    promotion: &Promotion,
    summary: &PromotionSummary,
    context: EvaluationContext,
) -> bool {
    if context.is_refund() {
        return true;
    }

    let rules = &promotion.promotion_rules;

    if rules
        .number_of_times_redeemable
        .is_some_and(|cap| cap <= summary.number_of_times_redeemed)
    {
        return false;
    }

    if rules
        .total_rewards_amount
        .is_some_and(|cap| cap <= summary.total_amount_redeemed)
    {
        return false;
    }

    if rules
        .total_number_of_customers
        .is_some_and(|cap| cap <= summary.total_number_of_customers)
    {
        return false;
    }

    true
}

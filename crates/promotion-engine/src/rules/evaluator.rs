//! 促销规则评估器
//!
//! 组合默认规则与汇总规则，从候选促销中筛选出合格的促销

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use super::{evaluate_default_rules, evaluate_summary_rules};
use crate::models::{EvaluationContext, Promotion, PromotionSummary};
use crate::repository::PromotionSummaryRepositoryTrait;

/// 合格促销及其汇总
pub type ValidPromotion = (Promotion, PromotionSummary);

/// 促销规则评估器
///
/// 读路径上的仓储失败按“不合格”降级处理，不向上传播
pub struct PromotionRulesEvaluator {
    summary_repo: Arc<dyn PromotionSummaryRepositoryTrait>,
}

impl PromotionRulesEvaluator {
    pub fn new(summary_repo: Arc<dyn PromotionSummaryRepositoryTrait>) -> Self {
        Self { summary_repo }
    }

    /// 筛选合格促销
    ///
    /// 对每个候选促销先评估默认规则，通过后加载汇总再评估汇总规则。
    /// 汇总缺失或加载失败的促销记录日志后视为不合格。
    #[instrument(skip(self, promotions), fields(candidates = promotions.len(), context = ?context))]
    pub async fn find_valid_promotions(
        &self,
        promotions: &[Promotion],
        order_amount: Decimal,
        context: EvaluationContext,
        customer_id: Option<&str>,
    ) -> Vec<ValidPromotion> {
        self.find_valid_promotions_on(
            Utc::now().date_naive(),
            promotions,
            order_amount,
            context,
            customer_id,
        )
        .await
    }

    /// 以指定日期为“今天”筛选合格促销
    pub async fn find_valid_promotions_on(
        &self,
        today: NaiveDate,
        promotions: &[Promotion],
        order_amount: Decimal,
        context: EvaluationContext,
        customer_id: Option<&str>,
    ) -> Vec<ValidPromotion> {
        let mut valid = Vec::new();

        for promotion in promotions {
            if !evaluate_default_rules(promotion, order_amount, context, customer_id, today) {
                debug!(promotion_id = %promotion.id, "促销未通过默认规则");
                continue;
            }

            let summary = match self.summary_repo.get_by_promotion_id(&promotion.id).await {
                Ok(Some(summary)) => summary,
                Ok(None) => {
                    warn!(promotion_id = %promotion.id, "促销汇总不存在，视为不合格");
                    continue;
                }
                Err(e) => {
                    warn!(promotion_id = %promotion.id, error = %e, "加载促销汇总失败，视为不合格");
                    continue;
                }
            };

            if !evaluate_summary_rules(promotion, &summary, context) {
                debug!(promotion_id = %promotion.id, "促销未通过汇总规则");
                continue;
            }

            valid.push((promotion.clone(), summary));
        }

        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::repository::MockPromotionSummaryRepositoryTrait;
    use crate::test_utils::promotion;
    use promo_shared::error::PromoError;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_filters_by_default_then_summary_rules() {
        let mut inactive = promotion("inactive", "m-1");
        inactive.active = false;
        let mut capped = promotion("capped", "m-1");
        capped.promotion_rules.number_of_times_redeemable = Some(1);
        let open = promotion("open", "m-1");

        let mut repo = MockPromotionSummaryRepositoryTrait::new();
        repo.expect_get_by_promotion_id()
            .withf(|id| id == "capped")
            .returning(|id| {
                Ok(Some(PromotionSummary {
                    number_of_times_redeemed: 1,
                    ..PromotionSummary::new(id)
                }))
            });
        repo.expect_get_by_promotion_id()
            .withf(|id| id == "open")
            .returning(|id| Ok(Some(PromotionSummary::new(id))));
        // 未通过默认规则的促销不应加载汇总
        repo.expect_get_by_promotion_id()
            .withf(|id| id == "inactive")
            .never();

        let evaluator = PromotionRulesEvaluator::new(Arc::new(repo));
        let valid = evaluator
            .find_valid_promotions(
                &[inactive, capped, open],
                dec!(100),
                EvaluationContext::OrderCreated,
                Some("c-1"),
            )
            .await;

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0.id, "open");
        assert_eq!(valid[0].1.promotion_id, "open");
    }

    #[tokio::test]
    async fn test_missing_or_failing_summary_is_ineligible() {
        let mut repo = MockPromotionSummaryRepositoryTrait::new();
        repo.expect_get_by_promotion_id()
            .withf(|id| id == "missing")
            .returning(|_| Ok(None));
        repo.expect_get_by_promotion_id()
            .withf(|id| id == "broken")
            .returning(|_| Err(EngineError::Shared(PromoError::Internal("db".to_string()))));

        let evaluator = PromotionRulesEvaluator::new(Arc::new(repo));
        let valid = evaluator
            .find_valid_promotions(
                &[promotion("missing", "m-1"), promotion("broken", "m-1")],
                dec!(100),
                EvaluationContext::CheckoutPresentation,
                None,
            )
            .await;

        assert!(valid.is_empty());
    }

    #[tokio::test]
    async fn test_refund_context_ignores_caps() {
        let mut p = promotion("p-1", "m-1");
        p.active = false;
        p.promotion_rules.total_number_of_customers = Some(1);

        let mut repo = MockPromotionSummaryRepositoryTrait::new();
        repo.expect_get_by_promotion_id().returning(|id| {
            Ok(Some(PromotionSummary {
                total_number_of_customers: 5,
                ..PromotionSummary::new(id)
            }))
        });

        let evaluator = PromotionRulesEvaluator::new(Arc::new(repo));
        let valid = evaluator
            .find_valid_promotions(&[p], dec!(10), EvaluationContext::OrderRefunded, None)
            .await;

        assert_eq!(valid.len(), 1);
    }
}

//! 订单创建对账

use promotion_engine::models::{
    CustomerChange, CustomerOrderRewardsLedger, EvaluationContext, PendingWrites,
    RewardTransaction, SummaryDelta, TransactionType,
};
use promotion_engine::select_largest_reward;
use tracing::{info, instrument};

use super::{ReconciliationOrchestrator, ReconciliationOutcome};
use crate::commands::OrderCreatedCommand;
use crate::error::{ReconciliationError, Result};

impl ReconciliationOrchestrator {
    /// 订单创建：识别商户，挑选奖励最大的合格促销并开账
    ///
    /// 账本连同待完成写入先落盘，再写汇总与促销客户名单，最后发布通知。
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id, customer_id = %cmd.customer_id))]
    pub(crate) async fn handle_created(
        &self,
        cmd: &OrderCreatedCommand,
    ) -> Result<ReconciliationOutcome> {
        if let Some(mut ledger) = self.ledger_repo.get_for_order(&cmd.order_id).await?
            && ledger.has_transaction(TransactionType::Created, None)
        {
            let resumed = self.resume_pending(&mut ledger).await?;
            if resumed.is_none() {
                info!("订单创建事件已处理，跳过");
            }
            return Ok(ReconciliationOutcome::replayed(resumed));
        }

        let merchant = self
            .merchant_identifier
            .identify_by_regex(&cmd.merchant_name)
            .await
            .ok_or_else(|| ReconciliationError::MerchantNotFound {
                order_id: cmd.order_id.clone(),
                merchant_name: cmd.merchant_name.clone(),
            })?;

        let promotions = self
            .promotion_repo
            .get_by_merchant_id(&merchant.merchant_id)
            .await?;

        let valid = self
            .evaluator
            .find_valid_promotions(
                &promotions,
                cmd.order_amount,
                EvaluationContext::OrderCreated,
                Some(&cmd.customer_id),
            )
            .await;

        let Some((reward, (promotion, _))) = select_largest_reward(
            &valid,
            |candidate| &candidate.0,
            cmd.order_amount,
            &cmd.order_id,
            &cmd.customer_id,
        ) else {
            info!(
                merchant_id = %merchant.merchant_id,
                candidates = promotions.len(),
                "订单没有合格促销"
            );
            return Ok(ReconciliationOutcome::NoEligiblePromotion);
        };

        let created = RewardTransaction::created(
            &cmd.order_id,
            cmd.order_amount,
            reward.amount,
            &cmd.authorization_id,
            &merchant,
        );
        let mut ledger =
            CustomerOrderRewardsLedger::open(&cmd.customer_id, merchant, promotion.clone(), created);
        ledger.pending = Some(PendingWrites::new(
            SummaryDelta::redeemed(reward.amount),
            CustomerChange::Add,
        ));
        self.ledger_repo.create(&ledger).await?;

        let reward_amount = self.complete(&mut ledger).await?;

        info!(
            promotion_id = %reward.promotion_id,
            reward = %reward_amount,
            "订单奖励已发放"
        );

        Ok(ReconciliationOutcome::Reconciled { reward_amount })
    }
}

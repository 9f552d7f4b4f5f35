//! 订单退款对账

use promotion_engine::calculate_reward;
use promotion_engine::models::{
    CustomerChange, EvaluationContext, PendingWrites, RewardTransaction, SummaryDelta,
    TransactionType,
};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::{ReconciliationOrchestrator, ReconciliationOutcome};
use crate::commands::OrderRefundedCommand;
use crate::error::Result;

impl ReconciliationOrchestrator {
    /// 订单退款：按退款后的订单金额重新评估账本上的促销
    ///
    /// 促销不再合格时完全取消资格；仍合格时按新金额重算奖励，只调整差额。
    /// 退款不会让余额回升，差额为 0 时不产生任何写入。
    #[instrument(
        skip(self, cmd),
        fields(order_id = %cmd.order_id, transaction_id = %cmd.transaction_id)
    )]
    pub(crate) async fn handle_refunded(
        &self,
        cmd: &OrderRefundedCommand,
    ) -> Result<ReconciliationOutcome> {
        let Some(mut ledger) = self.ledger_repo.get_for_order(&cmd.order_id).await? else {
            debug!("订单没有奖励账本，跳过退款");
            return Ok(ReconciliationOutcome::Skipped);
        };

        let resumed = self.resume_pending(&mut ledger).await?;
        if ledger.has_transaction(TransactionType::Refunded, Some(&cmd.transaction_id)) {
            if resumed.is_none() {
                info!("退款事件已处理，跳过");
            }
            return Ok(ReconciliationOutcome::replayed(resumed));
        }

        ledger.append(RewardTransaction::refunded(
            &cmd.order_id,
            &cmd.transaction_id,
            cmd.amount,
        ));
        let order_amount = ledger.current_order_amount()?;

        let promotion = ledger.promotion.clone();
        let valid = self
            .evaluator
            .find_valid_promotions(
                std::slice::from_ref(&promotion),
                order_amount,
                EvaluationContext::OrderRefunded,
                None,
            )
            .await;

        let recalculated = if valid.is_empty() {
            Decimal::ZERO
        } else {
            calculate_reward(order_amount, promotion.reward_rate_type, promotion.rate_amount)
                .max(Decimal::ZERO)
        };
        // 结算取消资格后余额为 0，退款不能再把奖励加回来
        let new_balance = recalculated.min(ledger.reward_balance);

        let difference = ledger.reward_balance - new_balance;
        if difference.is_zero() {
            warn!(order_amount = %order_amount, "退款后奖励差额为 0，不做调整");
            return Ok(ReconciliationOutcome::Skipped);
        }

        let full_disqualification = new_balance <= Decimal::ZERO;

        if let Some(refund) = ledger.transactions.last_mut() {
            refund.reward_amount = -difference;
        }
        ledger.reward_balance = new_balance;
        ledger.pending = Some(if full_disqualification {
            PendingWrites::new(SummaryDelta::disqualified(-difference), CustomerChange::Remove)
        } else {
            PendingWrites::summary_only(SummaryDelta::amount_only(-difference))
        });
        self.ledger_repo.update(&ledger).await?;

        let reward_amount = self.complete(&mut ledger).await?;

        info!(
            order_amount = %order_amount,
            new_balance = %new_balance,
            difference = %difference,
            full_disqualification,
            "退款对账完成"
        );

        Ok(ReconciliationOutcome::Reconciled { reward_amount })
    }
}

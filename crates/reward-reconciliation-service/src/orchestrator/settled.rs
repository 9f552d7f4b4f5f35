//! 订单结算对账

use std::collections::BTreeMap;

use promotion_engine::models::{
    CustomerChange, PendingWrites, RewardTransaction, SummaryDelta, TransactionType,
};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use super::{ReconciliationOrchestrator, ReconciliationOutcome};
use crate::commands::{MerchantTransactionDetail, OrderSettledCommand};
use crate::error::Result;

/// 按商户名称汇总净结算金额（captured - refunded）
fn net_amount_by_merchant(details: &[MerchantTransactionDetail]) -> BTreeMap<&str, Decimal> {
    let mut totals = BTreeMap::new();
    for detail in details {
        *totals
            .entry(detail.merchant_name.as_str())
            .or_insert(Decimal::ZERO) +=
            detail.total_gateway_captured - detail.total_gateway_refunded;
    }
    totals
}

impl ReconciliationOrchestrator {
    /// 订单结算
    ///
    /// 结算明细恰好只有一个商户且与开账商户同名时为正常结算，余额保留；
    /// 其他情况一律清零余额并取消资格。
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub(crate) async fn handle_settled(
        &self,
        cmd: &OrderSettledCommand,
    ) -> Result<ReconciliationOutcome> {
        let Some(mut ledger) = self.ledger_repo.get_for_order(&cmd.order_id).await? else {
            debug!("订单没有奖励账本，跳过结算");
            return Ok(ReconciliationOutcome::Skipped);
        };

        let resumed = self.resume_pending(&mut ledger).await?;
        if ledger.has_transaction(TransactionType::Settled, None) {
            if resumed.is_none() {
                info!("结算事件已处理，跳过");
            }
            return Ok(ReconciliationOutcome::replayed(resumed));
        }

        let totals = net_amount_by_merchant(&cmd.transaction_details);
        let clean = totals.len() == 1 && totals.contains_key(ledger.merchant.merchant_name.as_str());

        if clean {
            ledger.append(RewardTransaction::settled(&cmd.order_id, Decimal::ZERO));
            self.ledger_repo.update(&ledger).await?;
            info!(balance = %ledger.reward_balance, "订单正常结算");

            let reward_amount = self.complete(&mut ledger).await?;
            return Ok(ReconciliationOutcome::Reconciled { reward_amount });
        }

        let prior_balance = ledger.reward_balance;
        let adjustment = -prior_balance;
        ledger.reward_balance = Decimal::ZERO;
        ledger.append(RewardTransaction::settled(&cmd.order_id, adjustment));
        // 余额已为 0 说明此前退款时已经取消过资格
        if prior_balance > Decimal::ZERO {
            ledger.pending = Some(PendingWrites::new(
                SummaryDelta::disqualified(adjustment),
                CustomerChange::Remove,
            ));
        }
        self.ledger_repo.update(&ledger).await?;

        let reward_amount = self.complete(&mut ledger).await?;

        info!(
            merchants = totals.len(),
            adjustment = %adjustment,
            "结算商户不一致，奖励取消"
        );

        Ok(ReconciliationOutcome::Reconciled { reward_amount })
    }
}

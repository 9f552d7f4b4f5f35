//! 对账编排
//!
//! 每条生命周期命令对应一次对账：调整账本、促销客户名单与促销汇总，
//! 最后发布余额变更通知。
//!
//! 幂等依赖账本上的 `has_transaction` 检查，投递语义为至少一次。
//! 汇总与促销是两个独立的版本化聚合，各自通过比较并交换写入，
//! 冲突时重新加载并对最新版本重放同一增量。
//!
//! 账本先于汇总与促销写入：新交易与待完成写入（[`PendingWrites`]）一起落盘，
//! 之后逐步写汇总、促销并清除标记。中途失败时，重投的同一命令
//! 在幂等检查之前先补齐标记中剩余的写入，因此计数不会丢失也不会重复。

mod created;
mod refunded;
mod settled;

use std::sync::Arc;
use std::time::Instant;

use promo_shared::config::ReconciliationConfig;
use promo_shared::observability::metrics::{
    record_balance_notification, record_reconciliation, record_reconciliation_failure,
    record_summary_conflict,
};
use promotion_engine::error::{EngineError, Result as EngineResult};
use promotion_engine::merchant::MerchantIdentifier;
use promotion_engine::models::{
    CustomerChange, CustomerOrderRewardsLedger, PendingWrites, Promotion, PromotionSummary,
    SummaryDelta, TransactionType,
};
use promotion_engine::repository::{
    LedgerRepositoryTrait, PromotionRepositoryTrait, PromotionSummaryRepositoryTrait,
};
use promotion_engine::PromotionRulesEvaluator;
use rust_decimal::Decimal;
use tracing::{error, warn};

use crate::commands::LifecycleCommand;
use crate::error::Result;
use crate::messages::BalanceUpdateMessage;
use crate::notification::NotificationSender;

/// 单次对账的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// 重复投递或无需调整
    Skipped,
    /// 订单创建时没有合格促销
    NoEligiblePromotion,
    /// 已完成对账，`reward_amount` 为通知中的余额变动
    Reconciled { reward_amount: Decimal },
}

impl ReconciliationOutcome {
    /// 重复投递的结果：补齐了中断的写入时视为完成对账
    fn replayed(resumed: Option<Decimal>) -> Self {
        match resumed {
            Some(reward_amount) => Self::Reconciled { reward_amount },
            None => Self::Skipped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::NoEligiblePromotion => "no_eligible_promotion",
            Self::Reconciled { .. } => "reconciled",
        }
    }
}

/// 编排器运行参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 余额变更通知的目标 topic
    pub balance_update_topic: String,
    /// 汇总 / 促销写入的最大尝试次数
    pub max_write_attempts: u32,
}

impl From<&ReconciliationConfig> for OrchestratorSettings {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            balance_update_topic: config.balance_update_topic.clone(),
            max_write_attempts: config.summary_update_max_attempts.max(1),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ReconciliationConfig::default())
    }
}

/// 对账编排器
pub struct ReconciliationOrchestrator {
    ledger_repo: Arc<dyn LedgerRepositoryTrait>,
    promotion_repo: Arc<dyn PromotionRepositoryTrait>,
    summary_repo: Arc<dyn PromotionSummaryRepositoryTrait>,
    merchant_identifier: Arc<dyn MerchantIdentifier>,
    evaluator: Arc<PromotionRulesEvaluator>,
    notifier: Arc<dyn NotificationSender>,
    settings: OrchestratorSettings,
}

impl ReconciliationOrchestrator {
    pub fn new(
        ledger_repo: Arc<dyn LedgerRepositoryTrait>,
        promotion_repo: Arc<dyn PromotionRepositoryTrait>,
        summary_repo: Arc<dyn PromotionSummaryRepositoryTrait>,
        merchant_identifier: Arc<dyn MerchantIdentifier>,
        evaluator: Arc<PromotionRulesEvaluator>,
        notifier: Arc<dyn NotificationSender>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            ledger_repo,
            promotion_repo,
            summary_repo,
            merchant_identifier,
            evaluator,
            notifier,
            settings,
        }
    }

    /// 处理一条生命周期命令
    pub async fn handle(&self, command: &LifecycleCommand) -> Result<ReconciliationOutcome> {
        let started = Instant::now();

        let result = match command {
            LifecycleCommand::Created(cmd) => self.handle_created(cmd).await,
            LifecycleCommand::Refunded(cmd) => self.handle_refunded(cmd).await,
            LifecycleCommand::Settled(cmd) => self.handle_settled(cmd).await,
        };

        let command_name = command.transaction_type().as_str();
        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(e) => {
                record_reconciliation_failure(command_name, e.code());
                "failed"
            }
        };
        record_reconciliation(command_name, outcome, started.elapsed().as_secs_f64());

        result
    }

    // ==================== 聚合写入 ====================

    async fn load_summary(&self, promotion_id: &str) -> EngineResult<PromotionSummary> {
        self.summary_repo
            .get_by_promotion_id(promotion_id)
            .await?
            .ok_or_else(|| EngineError::not_found("PromotionSummary", promotion_id))
    }

    async fn load_promotion(&self, promotion_id: &str) -> EngineResult<Promotion> {
        self.promotion_repo
            .get_by_id(promotion_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Promotion", promotion_id))
    }

    /// 对汇总应用增量
    ///
    /// 总是从仓储加载最新版本；版本冲突时重新加载并重放同一增量。
    async fn apply_summary_delta(
        &self,
        promotion_id: &str,
        delta: SummaryDelta,
    ) -> EngineResult<PromotionSummary> {
        let mut current = self.load_summary(promotion_id).await?;

        let max_attempts = self.settings.max_write_attempts;
        for attempt in 1..=max_attempts {
            let mut next = current.clone();
            next.apply(&delta);

            match self.summary_repo.update(&next).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_version_conflict() => {
                    record_summary_conflict("PromotionSummary");
                    warn!(promotion_id, attempt, max_attempts, "促销汇总版本冲突");
                    if attempt < max_attempts {
                        current = self.load_summary(promotion_id).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::ConcurrencyConflict {
            entity: "PromotionSummary",
            id: promotion_id.to_string(),
        })
    }

    /// 修改促销并写回
    ///
    /// `mutate` 返回 false 表示无需写入。版本冲突时重新加载后再次修改。
    async fn update_promotion<F>(&self, promotion_id: &str, mutate: F) -> EngineResult<()>
    where
        F: Fn(&mut Promotion) -> bool + Send + Sync,
    {
        let mut current = self.load_promotion(promotion_id).await?;

        let max_attempts = self.settings.max_write_attempts;
        for attempt in 1..=max_attempts {
            let mut next = current.clone();
            if !mutate(&mut next) {
                return Ok(());
            }

            match self.promotion_repo.update(&next).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_version_conflict() => {
                    record_summary_conflict("Promotion");
                    warn!(promotion_id, attempt, max_attempts, "促销版本冲突");
                    if attempt < max_attempts {
                        current = self.load_promotion(promotion_id).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::ConcurrencyConflict {
            entity: "Promotion",
            id: promotion_id.to_string(),
        })
    }

    // ==================== 待完成写入 ====================

    /// 按账本上的标记写入汇总与促销，每完成一步回写账本
    async fn apply_pending_writes(
        &self,
        ledger: &mut CustomerOrderRewardsLedger,
    ) -> EngineResult<()> {
        let Some(PendingWrites { summary, customer }) = ledger.pending.clone() else {
            return Ok(());
        };
        let promotion_id = ledger.promotion.id.clone();

        if let Some(delta) = summary {
            self.apply_summary_delta(&promotion_id, delta).await?;
            ledger.clear_pending(|p| p.summary = None);
            if ledger.pending.is_some() {
                self.ledger_repo.update(ledger).await?;
            }
        }

        if let Some(change) = customer {
            let customer_id = ledger.customer_id.clone();
            self.update_promotion(&promotion_id, |p| match change {
                CustomerChange::Add => {
                    p.add_customer(&customer_id);
                    true
                }
                CustomerChange::Remove => p.remove_customer(&customer_id),
            })
            .await?;
            ledger.clear_pending(|p| p.customer = None);
        }

        self.ledger_repo.update(ledger).await?;
        Ok(())
    }

    /// 完成账本最后一笔交易：补齐聚合写入后发布通知，返回通知中的余额变动
    pub(crate) async fn complete(
        &self,
        ledger: &mut CustomerOrderRewardsLedger,
    ) -> EngineResult<Decimal> {
        self.apply_pending_writes(ledger).await?;

        let Some(message) = balance_update_for(ledger) else {
            return Ok(Decimal::ZERO);
        };
        let reward_amount = message.reward_amount;
        self.notify(message).await;
        Ok(reward_amount)
    }

    /// 补齐上一次中断的对账，没有待完成写入时返回 None
    pub(crate) async fn resume_pending(
        &self,
        ledger: &mut CustomerOrderRewardsLedger,
    ) -> EngineResult<Option<Decimal>> {
        if ledger.pending.is_none() {
            return Ok(None);
        }
        warn!(order_id = %ledger.order_id, "账本存在未完成的聚合写入，继续补齐");
        self.complete(ledger).await.map(Some)
    }

    /// 发布余额变更通知，失败只记录日志
    async fn notify(&self, message: BalanceUpdateMessage) {
        let transaction_type = message.transaction_type.as_str();
        match self
            .notifier
            .send(&message, &self.settings.balance_update_topic)
            .await
        {
            Ok(()) => record_balance_notification(transaction_type, "sent"),
            Err(e) => {
                error!(
                    order_id = %message.order_id,
                    transaction_type,
                    error = %e,
                    "发送余额变更通知失败"
                );
                record_balance_notification(transaction_type, "failed");
            }
        }
    }
}

/// 由账本最后一笔交易构造余额变更通知
fn balance_update_for(ledger: &CustomerOrderRewardsLedger) -> Option<BalanceUpdateMessage> {
    let tx = ledger.last_transaction()?;
    let (order_id, customer_id) = (ledger.order_id.as_str(), ledger.customer_id.as_str());

    match tx.transaction_type {
        TransactionType::Created => Some(BalanceUpdateMessage::created(
            tx.reward_amount,
            order_id,
            customer_id,
        )),
        // 退款交易记录的是负向影响，通知中为扣减的奖励
        TransactionType::Refunded => Some(BalanceUpdateMessage::refunded(
            -tx.reward_amount,
            order_id,
            customer_id,
        )),
        TransactionType::Settled => Some(BalanceUpdateMessage::settled(
            tx.reward_amount,
            order_id,
            customer_id,
        )),
        TransactionType::AmountIncreased | TransactionType::Unknown => None,
    }
}

//! 订单奖励对账流程集成测试
//!
//! 覆盖创建、退款、结算三类事件的完整对账流程（内存仓储，无需外部依赖）

mod common;

use common::{CUSTOMER, Harness, MERCHANT_NAME, RecordingNotifier, created, refunded, settled};
use promotion_engine::EngineError;
use promotion_engine::models::{Promotion, RateType, TransactionType};
use promotion_engine::test_utils::promotion;
use promo_shared::kafka::topics;
use reward_reconciliation::error::ReconciliationError;
use reward_reconciliation::orchestrator::ReconciliationOutcome;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn percentage(id: &str, rate: Decimal) -> Promotion {
    Promotion {
        reward_rate_type: RateType::Percentage,
        rate_amount: rate,
        ..promotion(id, "m-1")
    }
}

fn with_minimum(mut promotion: Promotion, minimum: Decimal) -> Promotion {
    promotion.promotion_rules.minimum_transaction_amount = minimum;
    promotion
}

async fn reconcile(h: &Harness, command: reward_reconciliation::commands::LifecycleCommand) -> ReconciliationOutcome {
    h.orchestrator.handle(&command).await.unwrap()
}

// ==================== 订单创建 ====================

#[tokio::test]
async fn test_created_awards_largest_reward() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    h.add_promotion(percentage("pct-5", dec!(5)));
    h.add_promotion(percentage("pct-7", dec!(7)));

    let outcome = reconcile(&h, created("o-1", dec!(100))).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(10)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.customer_id, CUSTOMER);
    assert_eq!(ledger.promotion.id, "fixed");
    assert_eq!(ledger.merchant.merchant_name, MERCHANT_NAME);
    assert_eq!(ledger.reward_balance, dec!(10));
    assert_eq!(ledger.replayed_balance(), ledger.reward_balance);

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 1);
    assert_eq!(summary.total_amount_redeemed, dec!(10));
    assert_eq!(summary.total_number_of_customers, 1);
    assert_eq!(h.promotions.get("fixed").unwrap().customer_ids, vec![CUSTOMER]);
    assert!(h.promotions.get("pct-7").unwrap().customer_ids.is_empty());

    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].transaction_type, TransactionType::Created);
    assert_eq!(messages[0].reward_amount, dec!(10));
    assert_eq!(h.notifier.queues().await, vec![topics::BALANCE_UPDATES]);
}

#[tokio::test]
async fn test_created_redelivery_is_noop() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));

    reconcile(&h, created("o-1", dec!(100))).await;
    let writes = (
        h.ledgers.write_count(),
        h.summaries.write_count(),
        h.promotions.write_count(),
    );

    let outcome = reconcile(&h, created("o-1", dec!(100))).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert_eq!(
        writes,
        (
            h.ledgers.write_count(),
            h.summaries.write_count(),
            h.promotions.write_count()
        )
    );
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 1);
    assert_eq!(h.notifier.messages().await.len(), 1);
}

#[tokio::test]
async fn test_created_unknown_merchant_fails() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));

    let mut command = created("o-1", dec!(100));
    if let reward_reconciliation::commands::LifecycleCommand::Created(cmd) = &mut command {
        cmd.merchant_name = "Unknown Shop".to_string();
    }

    let err = h.orchestrator.handle(&command).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::MerchantNotFound { .. }));
    assert!(!err.is_retryable());
    assert!(h.ledgers.get("o-1").is_none());
}

#[tokio::test]
async fn test_created_without_eligible_promotion() {
    let h = Harness::new();
    h.add_promotion(with_minimum(promotion("fixed", "m-1"), dec!(500)));

    let outcome = reconcile(&h, created("o-1", dec!(100))).await;

    assert_eq!(outcome, ReconciliationOutcome::NoEligiblePromotion);
    assert!(h.ledgers.get("o-1").is_none());
    assert!(h.notifier.messages().await.is_empty());
}

#[tokio::test]
async fn test_created_recovers_from_summary_conflict() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    h.summaries.inject_conflicts(1);

    reconcile(&h, created("o-1", dec!(100))).await;

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 1);
    assert_eq!(summary.total_amount_redeemed, dec!(10));
}

#[tokio::test]
async fn test_created_redelivery_completes_after_exhausted_conflicts() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    h.summaries.inject_conflicts(3);

    let err = h
        .orchestrator
        .handle(&created("o-1", dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconciliationError::Engine(EngineError::ConcurrencyConflict { .. })
    ));
    assert!(err.is_retryable());

    // 账本已落盘并带着待完成写入，计数与客户名单尚未变更
    let ledger = h.ledgers.get("o-1").unwrap();
    assert!(ledger.pending.is_some());
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 0);
    assert!(h.promotions.get("fixed").unwrap().customer_ids.is_empty());
    assert!(h.notifier.messages().await.is_empty());

    let outcome = reconcile(&h, created("o-1", dec!(100))).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(10)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert!(ledger.pending.is_none());
    assert_eq!(ledger.reward_balance, dec!(10));

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 1);
    assert_eq!(summary.total_amount_redeemed, dec!(10));
    assert_eq!(summary.total_number_of_customers, 1);
    assert_eq!(h.promotions.get("fixed").unwrap().customer_ids, vec![CUSTOMER]);

    let messages = h.notifier.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].reward_amount, dec!(10));

    assert_eq!(
        reconcile(&h, created("o-1", dec!(100))).await,
        ReconciliationOutcome::Skipped
    );
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 1);
}

#[tokio::test]
async fn test_created_redelivery_does_not_reapply_finished_summary() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    h.promotions.inject_conflicts(3);

    assert!(h.orchestrator.handle(&created("o-1", dec!(100))).await.is_err());
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 1);

    reconcile(&h, created("o-1", dec!(100))).await;

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 1);
    assert_eq!(summary.total_amount_redeemed, dec!(10));
    assert_eq!(h.promotions.get("fixed").unwrap().customer_ids, vec![CUSTOMER]);
    assert!(h.ledgers.get("o-1").unwrap().pending.is_none());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_reconciliation() {
    let h = Harness::with_notifier(RecordingNotifier::failing());
    h.add_promotion(promotion("fixed", "m-1"));

    let outcome = reconcile(&h, created("o-1", dec!(100))).await;

    assert!(matches!(outcome, ReconciliationOutcome::Reconciled { .. }));
    assert!(h.ledgers.get("o-1").is_some());
}

// ==================== 订单退款 ====================

#[tokio::test]
async fn test_partial_refund_adjusts_difference() {
    let h = Harness::new();
    h.add_promotion(percentage("pct", dec!(10)));
    reconcile(&h, created("o-1", dec!(200))).await;

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(50))).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(5)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, dec!(15));
    assert_eq!(ledger.replayed_balance(), dec!(15));
    assert!(ledger.has_transaction(TransactionType::Refunded, Some("t-1")));

    let summary = h.summaries.get("pct").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 1);
    assert_eq!(summary.total_amount_redeemed, dec!(15));
    assert_eq!(summary.total_number_of_customers, 1);
    assert_eq!(h.promotions.get("pct").unwrap().customer_ids, vec![CUSTOMER]);

    let last = h.notifier.messages().await.pop().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Refunded);
    assert_eq!(last.reward_amount, dec!(5));
    assert_eq!(last.customer_id, CUSTOMER);
}

#[tokio::test]
async fn test_refund_below_minimum_fully_disqualifies() {
    let h = Harness::new();
    h.add_promotion(with_minimum(promotion("fixed", "m-1"), dec!(100)));
    reconcile(&h, created("o-1", dec!(150))).await;

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(60))).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(10)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, Decimal::ZERO);
    assert_eq!(ledger.replayed_balance(), Decimal::ZERO);

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 0);
    assert_eq!(summary.total_amount_redeemed, Decimal::ZERO);
    assert_eq!(summary.total_number_of_customers, 0);
    assert!(h.promotions.get("fixed").unwrap().customer_ids.is_empty());
}

#[tokio::test]
async fn test_refund_redelivery_is_noop() {
    let h = Harness::new();
    h.add_promotion(percentage("pct", dec!(10)));
    reconcile(&h, created("o-1", dec!(200))).await;
    reconcile(&h, refunded("o-1", "t-1", dec!(50))).await;
    let ledger_writes = h.ledgers.write_count();

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(50))).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert_eq!(h.ledgers.write_count(), ledger_writes);
    assert_eq!(h.ledgers.get("o-1").unwrap().reward_balance, dec!(15));
}

#[tokio::test]
async fn test_second_refund_with_new_transaction_id_applies() {
    let h = Harness::new();
    h.add_promotion(percentage("pct", dec!(10)));
    reconcile(&h, created("o-1", dec!(200))).await;
    reconcile(&h, refunded("o-1", "t-1", dec!(50))).await;

    reconcile(&h, refunded("o-1", "t-2", dec!(50))).await;

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, dec!(10));
    assert_eq!(h.summaries.get("pct").unwrap().total_amount_redeemed, dec!(10));
}

#[tokio::test]
async fn test_refund_with_zero_difference_has_no_side_effects() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    reconcile(&h, created("o-1", dec!(100))).await;
    let ledger_writes = h.ledgers.write_count();
    let summary_writes = h.summaries.write_count();

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(20))).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert_eq!(h.ledgers.write_count(), ledger_writes);
    assert_eq!(h.summaries.write_count(), summary_writes);
    assert_eq!(h.notifier.messages().await.len(), 1);
}

#[tokio::test]
async fn test_refund_redelivery_completes_after_exhausted_conflicts() {
    let h = Harness::new();
    h.add_promotion(percentage("pct", dec!(10)));
    reconcile(&h, created("o-1", dec!(200))).await;
    h.summaries.inject_conflicts(3);

    assert!(
        h.orchestrator
            .handle(&refunded("o-1", "t-1", dec!(50)))
            .await
            .is_err()
    );
    assert_eq!(h.summaries.get("pct").unwrap().total_amount_redeemed, dec!(20));

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(50))).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(5)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, dec!(15));
    assert!(ledger.pending.is_none());
    assert_eq!(h.summaries.get("pct").unwrap().total_amount_redeemed, dec!(15));

    let last = h.notifier.messages().await.pop().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Refunded);
    assert_eq!(last.reward_amount, dec!(5));

    assert_eq!(
        reconcile(&h, refunded("o-1", "t-1", dec!(50))).await,
        ReconciliationOutcome::Skipped
    );
    assert_eq!(h.summaries.get("pct").unwrap().total_amount_redeemed, dec!(15));
}

#[tokio::test]
async fn test_refund_after_disqualifying_settlement_restores_nothing() {
    let h = Harness::new();
    h.add_promotion(percentage("pct", dec!(10)));
    reconcile(&h, created("o-1", dec!(100))).await;
    reconcile(&h, settled("o-1", &[("OTHER", dec!(100))])).await;
    let ledger_writes = h.ledgers.write_count();

    let outcome = reconcile(&h, refunded("o-1", "t-1", dec!(20))).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert_eq!(h.ledgers.write_count(), ledger_writes);
    assert_eq!(h.ledgers.get("o-1").unwrap().reward_balance, Decimal::ZERO);

    let summary = h.summaries.get("pct").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 0);
    assert_eq!(summary.total_amount_redeemed, Decimal::ZERO);
    assert_eq!(summary.total_number_of_customers, 0);
    assert_eq!(h.notifier.messages().await.len(), 2);
}

#[tokio::test]
async fn test_refund_without_ledger_is_ignored() {
    let h = Harness::new();

    let outcome = reconcile(&h, refunded("o-404", "t-1", dec!(20))).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert_eq!(h.ledgers.write_count(), 0);
}

// ==================== 订单结算 ====================

#[tokio::test]
async fn test_clean_settlement_keeps_balance() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    reconcile(&h, created("o-1", dec!(100))).await;

    let outcome = reconcile(&h, settled("o-1", &[(MERCHANT_NAME, dec!(100))])).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: Decimal::ZERO
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, dec!(10));
    assert!(ledger.has_transaction(TransactionType::Settled, None));
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 1);

    let last = h.notifier.messages().await.pop().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Settled);
    assert_eq!(last.reward_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_settlement_split_across_merchants_disqualifies_once() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    reconcile(&h, created("o-1", dec!(100))).await;

    let command = settled("o-1", &[(MERCHANT_NAME, dec!(60)), ("Globex", dec!(40))]);
    let outcome = reconcile(&h, command.clone()).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(-10)
        }
    );

    let ledger = h.ledgers.get("o-1").unwrap();
    assert_eq!(ledger.reward_balance, Decimal::ZERO);
    assert_eq!(ledger.replayed_balance(), Decimal::ZERO);

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 0);
    assert_eq!(summary.total_amount_redeemed, Decimal::ZERO);
    assert_eq!(summary.total_number_of_customers, 0);
    assert!(h.promotions.get("fixed").unwrap().customer_ids.is_empty());

    // 重复投递不再取消资格
    assert_eq!(reconcile(&h, command).await, ReconciliationOutcome::Skipped);
    assert_eq!(h.summaries.get("fixed").unwrap().number_of_times_redeemed, 0);
}

#[tokio::test]
async fn test_settlement_with_other_merchant_name_disqualifies() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    reconcile(&h, created("o-1", dec!(100))).await;

    reconcile(&h, settled("o-1", &[("ACME Outlet", dec!(100))])).await;

    assert_eq!(h.ledgers.get("o-1").unwrap().reward_balance, Decimal::ZERO);
    assert_eq!(h.summaries.get("fixed").unwrap().total_number_of_customers, 0);
}

#[tokio::test]
async fn test_settlement_after_full_refund_does_not_double_count() {
    let h = Harness::new();
    h.add_promotion(with_minimum(promotion("fixed", "m-1"), dec!(100)));
    reconcile(&h, created("o-1", dec!(150))).await;
    reconcile(&h, refunded("o-1", "t-1", dec!(150))).await;

    let outcome = reconcile(&h, settled("o-1", &[])).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: Decimal::ZERO
        }
    );

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 0);
    assert_eq!(summary.total_number_of_customers, 0);
}

#[tokio::test]
async fn test_settlement_redelivery_completes_disqualification() {
    let h = Harness::new();
    h.add_promotion(promotion("fixed", "m-1"));
    reconcile(&h, created("o-1", dec!(100))).await;
    h.promotions.inject_conflicts(3);

    let command = settled("o-1", &[("Globex", dec!(100))]);
    assert!(h.orchestrator.handle(&command).await.is_err());
    assert_eq!(h.promotions.get("fixed").unwrap().customer_ids, vec![CUSTOMER]);

    let outcome = reconcile(&h, command.clone()).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Reconciled {
            reward_amount: dec!(-10)
        }
    );

    let summary = h.summaries.get("fixed").unwrap();
    assert_eq!(summary.number_of_times_redeemed, 0);
    assert_eq!(summary.total_amount_redeemed, Decimal::ZERO);
    assert_eq!(summary.total_number_of_customers, 0);
    assert!(h.promotions.get("fixed").unwrap().customer_ids.is_empty());
    assert!(h.ledgers.get("o-1").unwrap().pending.is_none());

    assert_eq!(reconcile(&h, command).await, ReconciliationOutcome::Skipped);
}

#[tokio::test]
async fn test_settlement_without_ledger_is_ignored() {
    let h = Harness::new();

    let outcome = reconcile(&h, settled("o-404", &[(MERCHANT_NAME, dec!(1))])).await;

    assert_eq!(outcome, ReconciliationOutcome::Skipped);
    assert!(h.notifier.messages().await.is_empty());
}

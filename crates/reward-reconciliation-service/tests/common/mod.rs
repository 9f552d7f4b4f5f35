//! 集成测试公共设施
//!
//! 使用内存仓储与内存缓存组装完整的对账编排器，无需外部依赖。

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use promo_shared::cache::MemoryCache;
use promo_shared::config::ReconciliationConfig;
use promo_shared::error::PromoError;
use promotion_engine::PromotionRulesEvaluator;
use promotion_engine::merchant::MerchantIdentificationService;
use promotion_engine::models::{Merchant, Promotion, PromotionSummary};
use promotion_engine::test_utils::{
    InMemoryLedgerRepository, InMemoryMerchantRegexRepository, InMemoryMerchantRepository,
    InMemoryPromotionRepository, InMemorySummaryRepository, merchant,
};
use reward_reconciliation::commands::{
    LifecycleCommand, MerchantTransactionDetail, OrderCreatedCommand, OrderRefundedCommand,
    OrderSettledCommand,
};
use reward_reconciliation::messages::BalanceUpdateMessage;
use reward_reconciliation::notification::NotificationSender;
use reward_reconciliation::orchestrator::{OrchestratorSettings, ReconciliationOrchestrator};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

pub const CUSTOMER: &str = "c-1";
pub const MERCHANT_NAME: &str = "ACME";

// ==================== 通知发送器 ====================

/// 记录所有已发送通知的发送器
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<(BalanceUpdateMessage, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn messages(&self) -> Vec<BalanceUpdateMessage> {
        self.sent.read().await.iter().map(|(m, _)| m.clone()).collect()
    }

    pub async fn queues(&self) -> Vec<String> {
        self.sent.read().await.iter().map(|(_, q)| q.clone()).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, message: &BalanceUpdateMessage, queue_name: &str) -> Result<(), PromoError> {
        if self.fail {
            return Err(PromoError::Kafka("broker 不可达".to_string()));
        }
        self.sent
            .write()
            .await
            .push((message.clone(), queue_name.to_string()));
        Ok(())
    }
}

// ==================== 测试夹具 ====================

pub struct Harness {
    pub orchestrator: Arc<ReconciliationOrchestrator>,
    pub ledgers: Arc<InMemoryLedgerRepository>,
    pub promotions: Arc<InMemoryPromotionRepository>,
    pub summaries: Arc<InMemorySummaryRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub merchant: Merchant,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::default())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let merchant = merchant("m-1", MERCHANT_NAME);

        let merchants = InMemoryMerchantRepository::new();
        merchants.insert(merchant.clone());
        let regexes = InMemoryMerchantRegexRepository::from_merchants([&merchant]);

        let ledgers = Arc::new(InMemoryLedgerRepository::new());
        let promotions = Arc::new(InMemoryPromotionRepository::new());
        let summaries = Arc::new(InMemorySummaryRepository::new());
        let notifier = Arc::new(notifier);

        let config = ReconciliationConfig::default();
        let identifier = MerchantIdentificationService::new(
            Arc::new(MemoryCache::new()),
            Arc::new(regexes),
            Arc::new(merchants),
            &config,
        );

        let orchestrator = Arc::new(ReconciliationOrchestrator::new(
            ledgers.clone(),
            promotions.clone(),
            summaries.clone(),
            Arc::new(identifier),
            Arc::new(PromotionRulesEvaluator::new(summaries.clone())),
            notifier.clone(),
            OrchestratorSettings::from(&config),
        ));

        Self {
            orchestrator,
            ledgers,
            promotions,
            summaries,
            notifier,
            merchant,
        }
    }

    /// 登记促销及其空汇总
    pub fn add_promotion(&self, promotion: Promotion) {
        self.summaries
            .insert(PromotionSummary::new(promotion.id.clone()));
        self.promotions.insert(promotion);
    }
}

// ==================== 命令构造 ====================

pub fn created(order_id: &str, amount: Decimal) -> LifecycleCommand {
    OrderCreatedCommand {
        order_id: order_id.to_string(),
        customer_id: CUSTOMER.to_string(),
        external_merchant_id: "ext-m-1".to_string(),
        authorization_id: format!("auth-{order_id}"),
        merchant_name: format!("{MERCHANT_NAME} STORE #42"),
        order_amount: amount,
    }
    .into()
}

pub fn refunded(order_id: &str, transaction_id: &str, amount: Decimal) -> LifecycleCommand {
    OrderRefundedCommand {
        transaction_id: transaction_id.to_string(),
        order_id: order_id.to_string(),
        customer_id: CUSTOMER.to_string(),
        external_merchant_id: "ext-m-1".to_string(),
        amount,
        currency_code: "USD".to_string(),
    }
    .into()
}

pub fn settled(order_id: &str, details: &[(&str, Decimal)]) -> LifecycleCommand {
    OrderSettledCommand {
        order_id: order_id.to_string(),
        transaction_details: details
            .iter()
            .map(|(name, captured)| MerchantTransactionDetail {
                merchant_name: name.to_string(),
                total_gateway_captured: *captured,
                total_gateway_refunded: Decimal::ZERO,
            })
            .collect(),
    }
    .into()
}

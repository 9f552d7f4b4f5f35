//! 测试工具
//!
//! 提供领域对象构造器和基于内存的仓储实现，供本 crate 及下游服务的测试使用。
//! 内存仓储与 Postgres 实现保持相同的版本号语义，并支持注入并发冲突。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use promo_shared::error::PromoError;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{
    CustomerOrderRewardsLedger, Merchant, MerchantAddress, MerchantRegex, Promotion,
    PromotionRules, PromotionSummary, PromotionType, RateType,
};
use crate::repository::{
    LedgerRepositoryTrait, MerchantRegexRepositoryTrait, MerchantRepositoryTrait,
    PromotionRepositoryTrait, PromotionSummaryRepositoryTrait,
};

// ============================================================================
// 构造器
// ============================================================================

/// 生效中的固定 10 元返现促销，有效期为昨天到明天
pub fn promotion(id: &str, merchant_id: &str) -> Promotion {
    let now = Utc::now();
    Promotion {
        id: id.to_string(),
        merchant_id: merchant_id.to_string(),
        promotion_name: format!("Promotion {}", id),
        promotion_rules: PromotionRules::default(),
        promotion_type: Some(PromotionType::CashBack),
        promotion_description: String::new(),
        promotion_start_date: now - Duration::days(1),
        promotion_end_date: now + Duration::days(1),
        reward_rate_type: RateType::Fixed,
        rate_amount: Decimal::TEN,
        active: true,
        deleted: false,
        created_at: now,
        modified_at: None,
        customer_ids: Vec::new(),
        version: 0,
    }
}

pub fn promotion_with_rate(id: &str, rate_type: RateType, rate_amount: Decimal) -> Promotion {
    Promotion {
        reward_rate_type: rate_type,
        rate_amount,
        ..promotion(id, "m-1")
    }
}

/// 商户，正则为不区分大小写的名称前缀匹配
pub fn merchant(id: &str, name: &str) -> Merchant {
    Merchant {
        id: id.to_string(),
        merchant_id: id.to_string(),
        external_merchant_id: format!("ext-{}", id),
        merchant_name: name.to_string(),
        description: String::new(),
        merchant_type: "Online".to_string(),
        business_type: "Retail".to_string(),
        address: MerchantAddress::default(),
        regex_patterns: vec![format!("(?i)^{}", regex::escape(name))],
        created_at: Utc::now(),
        modified_at: None,
        deleted: false,
        active: true,
    }
}

fn conflict(entity: &str, id: &str, expected_version: i64) -> PromoError {
    PromoError::ConcurrencyConflict {
        entity: entity.to_string(),
        id: id.to_string(),
        expected_version,
    }
}

/// 消耗一次注入的冲突
fn take_conflict(pending: &AtomicU32) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ============================================================================
// 促销
// ============================================================================

/// 内存促销仓储
#[derive(Default)]
pub struct InMemoryPromotionRepository {
    promotions: Mutex<HashMap<String, Promotion>>,
    pending_conflicts: AtomicU32,
    writes: AtomicUsize,
}

impl InMemoryPromotionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, promotion: Promotion) {
        self.promotions
            .lock()
            .insert(promotion.id.clone(), promotion);
    }

    pub fn get(&self, id: &str) -> Option<Promotion> {
        self.promotions.lock().get(id).cloned()
    }

    /// 接下来的 `count` 次更新模拟并发写入者抢先提交
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn sorted(mut promotions: Vec<Promotion>) -> Vec<Promotion> {
        promotions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        promotions
    }
}

#[async_trait]
impl PromotionRepositoryTrait for InMemoryPromotionRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Promotion>> {
        Ok(self.get(id))
    }

    async fn get_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Promotion>> {
        let promotions = self
            .promotions
            .lock()
            .values()
            .filter(|p| p.merchant_id == merchant_id && p.active && !p.deleted)
            .cloned()
            .collect();
        Ok(Self::sorted(promotions))
    }

    async fn get_active(&self) -> Result<Vec<Promotion>> {
        let promotions = self
            .promotions
            .lock()
            .values()
            .filter(|p| p.active && !p.deleted)
            .cloned()
            .collect();
        Ok(Self::sorted(promotions))
    }

    async fn update(&self, promotion: &Promotion) -> Result<Promotion> {
        let mut promotions = self.promotions.lock();
        let stored = promotions
            .get_mut(&promotion.id)
            .ok_or_else(|| conflict("Promotion", &promotion.id, promotion.version))?;

        if take_conflict(&self.pending_conflicts) {
            stored.version += 1;
        }
        if stored.version != promotion.version {
            return Err(conflict("Promotion", &promotion.id, promotion.version).into());
        }

        let mut updated = promotion.clone();
        updated.version += 1;
        updated.modified_at = Some(Utc::now());
        *stored = updated.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

// ============================================================================
// 促销汇总
// ============================================================================

/// 内存促销汇总仓储
#[derive(Default)]
pub struct InMemorySummaryRepository {
    summaries: Mutex<HashMap<String, PromotionSummary>>,
    pending_conflicts: AtomicU32,
    writes: AtomicUsize,
}

impl InMemorySummaryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, summary: PromotionSummary) {
        self.summaries
            .lock()
            .insert(summary.promotion_id.clone(), summary);
    }

    pub fn get(&self, promotion_id: &str) -> Option<PromotionSummary> {
        self.summaries.lock().get(promotion_id).cloned()
    }

    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromotionSummaryRepositoryTrait for InMemorySummaryRepository {
    async fn get_by_promotion_id(&self, promotion_id: &str) -> Result<Option<PromotionSummary>> {
        Ok(self.get(promotion_id))
    }

    async fn create(&self, summary: &PromotionSummary) -> Result<PromotionSummary> {
        let mut summaries = self.summaries.lock();
        let stored = summaries
            .entry(summary.promotion_id.clone())
            .or_insert_with(|| PromotionSummary {
                version: 0,
                ..summary.clone()
            });
        Ok(stored.clone())
    }

    async fn update(&self, summary: &PromotionSummary) -> Result<PromotionSummary> {
        let mut summaries = self.summaries.lock();
        let stored = summaries
            .get_mut(&summary.promotion_id)
            .ok_or_else(|| conflict("PromotionSummary", &summary.promotion_id, summary.version))?;

        if take_conflict(&self.pending_conflicts) {
            stored.version += 1;
        }
        if stored.version != summary.version {
            return Err(
                conflict("PromotionSummary", &summary.promotion_id, summary.version).into(),
            );
        }

        let mut updated = summary.clone();
        updated.version += 1;
        *stored = updated.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

// ============================================================================
// 账本
// ============================================================================

/// 内存账本仓储，写入即按订单 ID 覆盖
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    ledgers: Mutex<HashMap<String, CustomerOrderRewardsLedger>>,
    writes: AtomicUsize,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ledger: CustomerOrderRewardsLedger) {
        self.ledgers.lock().insert(ledger.order_id.clone(), ledger);
    }

    pub fn get(&self, order_id: &str) -> Option<CustomerOrderRewardsLedger> {
        self.ledgers.lock().get(order_id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn upsert(&self, ledger: &CustomerOrderRewardsLedger) -> CustomerOrderRewardsLedger {
        self.ledgers
            .lock()
            .insert(ledger.order_id.clone(), ledger.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        ledger.clone()
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    async fn get_for_order(&self, order_id: &str) -> Result<Option<CustomerOrderRewardsLedger>> {
        Ok(self.get(order_id))
    }

    async fn create(
        &self,
        ledger: &CustomerOrderRewardsLedger,
    ) -> Result<CustomerOrderRewardsLedger> {
        Ok(self.upsert(ledger))
    }

    async fn update(
        &self,
        ledger: &CustomerOrderRewardsLedger,
    ) -> Result<CustomerOrderRewardsLedger> {
        Ok(self.upsert(ledger))
    }
}

// ============================================================================
// 商户
// ============================================================================

/// 内存商户仓储
#[derive(Default)]
pub struct InMemoryMerchantRepository {
    merchants: Mutex<HashMap<String, Merchant>>,
}

impl InMemoryMerchantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, merchant: Merchant) {
        self.merchants.lock().insert(merchant.id.clone(), merchant);
    }
}

#[async_trait]
impl MerchantRepositoryTrait for InMemoryMerchantRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Merchant>> {
        Ok(self.merchants.lock().get(id).cloned())
    }

    async fn get_active_by_ids(&self, merchant_ids: &[String]) -> Result<Vec<Merchant>> {
        let mut merchants: Vec<Merchant> = self
            .merchants
            .lock()
            .values()
            .filter(|m| m.active && !m.deleted && merchant_ids.contains(&m.merchant_id))
            .cloned()
            .collect();
        merchants.sort_by(|a, b| a.merchant_id.cmp(&b.merchant_id));
        Ok(merchants)
    }
}

/// 内存商户正则仓储，保持插入顺序
#[derive(Default)]
pub struct InMemoryMerchantRegexRepository {
    regexes: Mutex<Vec<MerchantRegex>>,
    reads: AtomicUsize,
}

impl InMemoryMerchantRegexRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由商户列表构造正则投影
    pub fn from_merchants<'a>(merchants: impl IntoIterator<Item = &'a Merchant>) -> Self {
        let repo = Self::new();
        repo.regexes
            .lock()
            .extend(merchants.into_iter().map(MerchantRegex::from));
        repo
    }

    pub fn patterns_for(&self, merchant_id: &str) -> Option<Vec<String>> {
        self.regexes
            .lock()
            .iter()
            .find(|r| r.id == merchant_id)
            .map(|r| r.regex_patterns.clone())
    }

    /// `get_all` 被调用的次数，用于验证缓存命中
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MerchantRegexRepositoryTrait for InMemoryMerchantRegexRepository {
    async fn get_all(&self) -> Result<Vec<MerchantRegex>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.regexes.lock().clone())
    }

    async fn replace_patterns(&self, regex: &MerchantRegex) -> Result<()> {
        let mut regexes = self.regexes.lock();
        match regexes.iter_mut().find(|r| r.id == regex.id) {
            Some(existing) => existing.regex_patterns = regex.regex_patterns.clone(),
            None => regexes.push(regex.clone()),
        }
        Ok(())
    }
}

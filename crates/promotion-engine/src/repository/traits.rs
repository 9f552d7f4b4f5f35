//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于业务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    CustomerOrderRewardsLedger, Merchant, MerchantRegex, Promotion, PromotionSummary,
};

/// 促销仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromotionRepositoryTrait: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Promotion>>;

    /// 商户下所有生效中的促销
    async fn get_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Promotion>>;

    /// 所有生效中的促销
    async fn get_active(&self) -> Result<Vec<Promotion>>;

    /// 按版本号比较并更新，返回版本号递增后的促销
    async fn update(&self, promotion: &Promotion) -> Result<Promotion>;
}

/// 促销汇总仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromotionSummaryRepositoryTrait: Send + Sync {
    async fn get_by_promotion_id(&self, promotion_id: &str) -> Result<Option<PromotionSummary>>;

    async fn create(&self, summary: &PromotionSummary) -> Result<PromotionSummary>;

    /// 按版本号比较并更新，版本不一致返回并发冲突
    async fn update(&self, summary: &PromotionSummary) -> Result<PromotionSummary>;
}

/// 订单奖励账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    async fn get_for_order(&self, order_id: &str) -> Result<Option<CustomerOrderRewardsLedger>>;

    async fn create(&self, ledger: &CustomerOrderRewardsLedger)
    -> Result<CustomerOrderRewardsLedger>;

    async fn update(&self, ledger: &CustomerOrderRewardsLedger)
    -> Result<CustomerOrderRewardsLedger>;
}

/// 商户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantRepositoryTrait: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Merchant>>;

    /// 按内部商户 ID 批量获取生效中的商户
    async fn get_active_by_ids(&self, merchant_ids: &[String]) -> Result<Vec<Merchant>>;
}

/// 商户正则仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantRegexRepositoryTrait: Send + Sync {
    async fn get_all(&self) -> Result<Vec<MerchantRegex>>;

    /// 用新的正则列表整体替换商户现有的正则
    async fn replace_patterns(&self, regex: &MerchantRegex) -> Result<()>;
}

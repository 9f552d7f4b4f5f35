//! 商户正则缓存维护
//!
//! 启动时预热正则列表，收到商户/促销变更通知时失效相关缓存键。

use std::sync::Arc;
use std::time::Duration;

use promo_shared::cache::{CacheKey, CacheStore, get_or_load, invalidate};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{Merchant, MerchantRegex, Promotion};
use crate::repository::MerchantRegexRepositoryTrait;

/// 商户正则缓存管理器
pub struct MerchantRegexCacheManager {
    cache: Arc<dyn CacheStore>,
    regex_repo: Arc<dyn MerchantRegexRepositoryTrait>,
    cache_ttl: Duration,
}

impl MerchantRegexCacheManager {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        regex_repo: Arc<dyn MerchantRegexRepositoryTrait>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            regex_repo,
            cache_ttl,
        }
    }

    /// 预热正则列表，返回加载到的商户数，失败时返回 0
    pub async fn hydrate(&self) -> usize {
        let key = CacheKey::merchant_regex_lookup();
        let loaded: Result<Vec<MerchantRegex>> =
            get_or_load(self.cache.as_ref(), &key, self.cache_ttl, || {
                self.regex_repo.get_all()
            })
            .await;

        match loaded {
            Ok(regexes) => {
                info!(merchants = regexes.len(), "商户正则缓存预热完成");
                regexes.len()
            }
            Err(e) => {
                warn!(error = %e, "商户正则缓存预热失败");
                0
            }
        }
    }

    /// 商户变更：失效商户缓存，替换其正则并失效正则列表
    #[instrument(skip(self, merchant), fields(merchant_id = %merchant.id))]
    pub async fn on_merchant_changed(&self, merchant: &Merchant) -> Result<()> {
        invalidate(self.cache.as_ref(), &CacheKey::merchant(&merchant.id)).await;

        self.regex_repo
            .replace_patterns(&MerchantRegex::from(merchant))
            .await?;

        invalidate(self.cache.as_ref(), &CacheKey::merchant_regex_lookup()).await;
        info!(patterns = merchant.regex_patterns.len(), "商户正则已更新");
        Ok(())
    }

    /// 促销变更：失效促销、所属商户的收银台优惠以及 App 优惠缓存
    #[instrument(skip(self, promotion), fields(promotion_id = %promotion.id))]
    pub async fn on_promotion_changed(&self, promotion: &Promotion) {
        invalidate(self.cache.as_ref(), &CacheKey::promotion(&promotion.id)).await;
        invalidate(self.cache.as_ref(), &CacheKey::merchant(&promotion.merchant_id)).await;
        invalidate(self.cache.as_ref(), &CacheKey::app_offers()).await;
    }
}

//! 商户识别
//!
//! 入站订单只带自由文本的商户名称，通过各商户配置的正则列表识别出商户。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promo_shared::cache::{CacheKey, CacheStore, get_or_load};
use promo_shared::config::ReconciliationConfig;
use promo_shared::observability::metrics::record_merchant_identification;
use tracing::{debug, error, info, instrument, warn};

use super::regex_matcher::BoundedRegexMatcher;
use crate::models::{Merchant, MerchantRegex};
use crate::repository::{MerchantRegexRepositoryTrait, MerchantRepositoryTrait};

/// 商户识别接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantIdentifier: Send + Sync {
    /// 按商户名称识别商户，未识别返回 None
    async fn identify_by_regex(&self, merchant_name: &str) -> Option<Merchant>;
}

/// 基于缓存正则列表的商户识别服务
///
/// 识别过程中的任何失败都只记录日志并返回 None。
pub struct MerchantIdentificationService {
    cache: Arc<dyn CacheStore>,
    regex_repo: Arc<dyn MerchantRegexRepositoryTrait>,
    merchant_repo: Arc<dyn MerchantRepositoryTrait>,
    matcher: BoundedRegexMatcher,
    cache_ttl: Duration,
}

impl MerchantIdentificationService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        regex_repo: Arc<dyn MerchantRegexRepositoryTrait>,
        merchant_repo: Arc<dyn MerchantRepositoryTrait>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            cache,
            regex_repo,
            merchant_repo,
            matcher: BoundedRegexMatcher::new(config.regex_match_timeout()),
            cache_ttl: config.cache_ttl(),
        }
    }

    async fn load_regexes(&self) -> Option<Vec<MerchantRegex>> {
        let key = CacheKey::merchant_regex_lookup();
        match get_or_load(self.cache.as_ref(), &key, self.cache_ttl, || {
            self.regex_repo.get_all()
        })
        .await
        {
            Ok(regexes) if regexes.is_empty() => {
                error!("商户正则列表为空，无法识别商户");
                None
            }
            Ok(regexes) => Some(regexes),
            Err(e) => {
                error!(error = %e, "加载商户正则列表失败");
                None
            }
        }
    }

    async fn find_match<'a>(
        &self,
        regexes: &'a [MerchantRegex],
        merchant_name: &str,
    ) -> Option<&'a MerchantRegex> {
        for regex in regexes {
            if self
                .matcher
                .matches_any(&regex.regex_patterns, merchant_name)
                .await
            {
                return Some(regex);
            }
        }
        None
    }
}

#[async_trait]
impl MerchantIdentifier for MerchantIdentificationService {
    #[instrument(skip(self))]
    async fn identify_by_regex(&self, merchant_name: &str) -> Option<Merchant> {
        if merchant_name.trim().is_empty() {
            debug!("商户名称为空");
            record_merchant_identification("empty_name");
            return None;
        }

        let Some(regexes) = self.load_regexes().await else {
            record_merchant_identification("error");
            return None;
        };

        let Some(matched) = self.find_match(&regexes, merchant_name).await else {
            info!(merchant_name = %merchant_name, "未能通过正则识别商户");
            record_merchant_identification("unmatched");
            return None;
        };

        match self.merchant_repo.get_by_id(&matched.id).await {
            Ok(Some(merchant)) => {
                debug!(merchant_id = %merchant.id, "商户识别成功");
                record_merchant_identification("matched");
                Some(merchant)
            }
            Ok(None) => {
                warn!(merchant_id = %matched.id, "正则匹配到的商户不存在");
                record_merchant_identification("missing");
                None
            }
            Err(e) => {
                error!(merchant_id = %matched.id, error = %e, "加载商户失败");
                record_merchant_identification("error");
                None
            }
        }
    }
}

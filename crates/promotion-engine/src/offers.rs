//! 优惠查询
//!
//! 收银台与 App 的只读优惠展示，数据通过读穿缓存获取。
//! 这是提供给外部 HTTP 层的库接口，对账服务进程本身不暴露 HTTP 路由。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use promo_shared::cache::{CacheKey, CacheStore, get_or_load};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::calculator::calculate_reward;
use crate::error::Result;
use crate::models::{EvaluationContext, Merchant, Promotion, RateType};
use crate::repository::{MerchantRepositoryTrait, PromotionRepositoryTrait};
use crate::rules::PromotionRulesEvaluator;

/// 收银台优惠：一个合格促销及其对本单的折扣
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOffer {
    pub merchant_id: String,
    pub external_merchant_id: String,
    pub merchant_name: String,
    pub promotion_name: String,
    pub promotion_description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
}

/// App 优惠
///
/// `rate_fixed` 与 `rate_percentage` 互斥，未使用的一项为 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOffer {
    pub external_merchant_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub promotion_type: String,
    pub start_date: DateTime<Utc>,
    pub rate_fixed: Decimal,
    pub rate_percentage: Decimal,
}

/// App 优惠分页结果，目前总是单页
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOffersPage {
    #[serde(rename = "resultList")]
    pub offers: Vec<AppOffer>,
    pub has_more: bool,
    pub token: String,
}

/// 优惠查询服务
pub struct OffersService {
    cache: Arc<dyn CacheStore>,
    merchant_repo: Arc<dyn MerchantRepositoryTrait>,
    promotion_repo: Arc<dyn PromotionRepositoryTrait>,
    evaluator: Arc<PromotionRulesEvaluator>,
    cache_ttl: Duration,
}

impl OffersService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        merchant_repo: Arc<dyn MerchantRepositoryTrait>,
        promotion_repo: Arc<dyn PromotionRepositoryTrait>,
        evaluator: Arc<PromotionRulesEvaluator>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            merchant_repo,
            promotion_repo,
            evaluator,
            cache_ttl,
        }
    }

    /// 收银台优惠
    ///
    /// 商户不存在时记录错误并返回空列表；不按客户过滤。
    #[instrument(skip(self))]
    pub async fn offers_for_checkout(
        &self,
        merchant_id: &str,
        order_amount: Decimal,
    ) -> Result<Vec<CheckoutOffer>> {
        let cached: Result<Option<(Merchant, Vec<Promotion>)>> = get_or_load(
            self.cache.as_ref(),
            &CacheKey::merchant(merchant_id),
            self.cache_ttl,
            || async {
                let Some(merchant) = self.merchant_repo.get_by_id(merchant_id).await? else {
                    error!(merchant_id = %merchant_id, "查询收银台优惠时商户不存在");
                    return Ok(None);
                };
                let promotions = self
                    .promotion_repo
                    .get_by_merchant_id(&merchant.merchant_id)
                    .await?;
                Ok(Some((merchant, promotions)))
            },
        )
        .await;

        let Some((merchant, promotions)) = cached? else {
            return Ok(Vec::new());
        };
        if promotions.is_empty() {
            debug!(merchant_id = %merchant_id, "商户没有生效中的促销");
            return Ok(Vec::new());
        }

        let valid = self
            .evaluator
            .find_valid_promotions(
                &promotions,
                order_amount,
                EvaluationContext::CheckoutPresentation,
                None,
            )
            .await;

        Ok(valid
            .into_iter()
            .map(|(promotion, _)| CheckoutOffer {
                merchant_id: merchant.merchant_id.clone(),
                external_merchant_id: merchant.external_merchant_id.clone(),
                merchant_name: merchant.merchant_name.clone(),
                discount_amount: calculate_reward(
                    order_amount,
                    promotion.reward_rate_type,
                    promotion.rate_amount,
                ),
                promotion_name: promotion.promotion_name,
                promotion_description: promotion.promotion_description,
                start_date: promotion.promotion_start_date,
                end_date: promotion.promotion_end_date,
                order_amount,
            })
            .collect())
    }

    /// App 优惠
    ///
    /// 所有生效促销按商户展开，商户未生效的促销不展示。
    #[instrument(skip(self))]
    pub async fn offers_for_app(&self) -> Result<AppOffersPage> {
        let cached: Result<Option<(Vec<Merchant>, Vec<Promotion>)>> = get_or_load(
            self.cache.as_ref(),
            &CacheKey::app_offers(),
            self.cache_ttl,
            || async {
                let promotions = self.promotion_repo.get_active().await?;
                if promotions.is_empty() {
                    return Ok(None);
                }

                let merchant_ids: Vec<String> = promotions
                    .iter()
                    .map(|p| p.merchant_id.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let merchants = self.merchant_repo.get_active_by_ids(&merchant_ids).await?;
                Ok(Some((merchants, promotions)))
            },
        )
        .await;

        let Some((merchants, promotions)) = cached? else {
            return Ok(AppOffersPage::default());
        };

        let offers = merchants
            .iter()
            .flat_map(|merchant| {
                promotions
                    .iter()
                    .filter(move |p| p.merchant_id == merchant.merchant_id)
                    .map(move |p| app_offer(merchant, p))
            })
            .collect();

        Ok(AppOffersPage {
            offers,
            has_more: false,
            token: String::new(),
        })
    }
}

fn app_offer(merchant: &Merchant, promotion: &Promotion) -> AppOffer {
    let (rate_fixed, rate_percentage) = match promotion.reward_rate_type {
        RateType::Fixed => (promotion.rate_amount, Decimal::ZERO),
        RateType::Percentage => (Decimal::ZERO, promotion.rate_amount),
    };

    AppOffer {
        external_merchant_id: merchant.external_merchant_id.clone(),
        name: promotion.promotion_name.clone(),
        promotion_type: promotion
            .promotion_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        start_date: promotion.promotion_start_date,
        rate_fixed,
        rate_percentage,
    }
}

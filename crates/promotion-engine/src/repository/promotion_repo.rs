//! 促销仓储
//!
//! 提供促销定义的数据访问，写入使用版本号做乐观并发控制

use async_trait::async_trait;
use promo_shared::error::PromoError;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use super::traits::PromotionRepositoryTrait;
use crate::error::Result;
use crate::models::Promotion;

const PROMOTION_COLUMNS: &str = r#"
    id, merchant_id, promotion_name, promotion_rules, promotion_type,
    promotion_description, promotion_start_date, promotion_end_date,
    reward_rate_type, rate_amount, active, deleted, created_at, modified_at,
    customer_ids, version
"#;

/// 促销仓储
pub struct PromotionRepository {
    pool: PgPool,
}

impl PromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 获取单个促销（包含已删除）
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Promotion>> {
        let promotion = sqlx::query_as::<_, Promotion>(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(promotion)
    }

    /// 商户下生效中的促销
    pub async fn get_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Promotion>> {
        let promotions = sqlx::query_as::<_, Promotion>(&format!(
            r#"
            SELECT {PROMOTION_COLUMNS} FROM promotions
            WHERE merchant_id = $1 AND active = true AND deleted = false
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(promotions)
    }

    /// 所有生效中的促销
    pub async fn get_active(&self) -> Result<Vec<Promotion>> {
        let promotions = sqlx::query_as::<_, Promotion>(&format!(
            r#"
            SELECT {PROMOTION_COLUMNS} FROM promotions
            WHERE active = true AND deleted = false
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(promotions)
    }

    /// 比较版本号后更新
    ///
    /// 只有数据库中的版本与 `promotion.version` 一致时才写入，成功后版本号加一。
    #[instrument(skip(self, promotion), fields(promotion_id = %promotion.id, version = promotion.version))]
    pub async fn update(&self, promotion: &Promotion) -> Result<Promotion> {
        let updated = sqlx::query_as::<_, Promotion>(&format!(
            r#"
            UPDATE promotions
            SET promotion_name = $3, promotion_rules = $4, promotion_type = $5,
                promotion_description = $6, promotion_start_date = $7,
                promotion_end_date = $8, reward_rate_type = $9, rate_amount = $10,
                active = $11, deleted = $12, customer_ids = $13,
                modified_at = NOW(), version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {PROMOTION_COLUMNS}
            "#
        ))
        .bind(&promotion.id)
        .bind(promotion.version)
        .bind(&promotion.promotion_name)
        .bind(Json(&promotion.promotion_rules))
        .bind(promotion.promotion_type)
        .bind(&promotion.promotion_description)
        .bind(promotion.promotion_start_date)
        .bind(promotion.promotion_end_date)
        .bind(promotion.reward_rate_type)
        .bind(promotion.rate_amount)
        .bind(promotion.active)
        .bind(promotion.deleted)
        .bind(&promotion.customer_ids)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            PromoError::ConcurrencyConflict {
                entity: "Promotion".to_string(),
                id: promotion.id.clone(),
                expected_version: promotion.version,
            }
            .into()
        })
    }
}

#[async_trait]
impl PromotionRepositoryTrait for PromotionRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Promotion>> {
        self.get_by_id(id).await
    }

    async fn get_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Promotion>> {
        self.get_by_merchant_id(merchant_id).await
    }

    async fn get_active(&self) -> Result<Vec<Promotion>> {
        self.get_active().await
    }

    async fn update(&self, promotion: &Promotion) -> Result<Promotion> {
        self.update(promotion).await
    }
}

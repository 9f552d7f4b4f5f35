//! 商户仓储
//!
//! 提供商户及商户识别正则的数据访问

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::{MerchantRegexRepositoryTrait, MerchantRepositoryTrait};
use crate::error::Result;
use crate::models::{Merchant, MerchantRegex};

const MERCHANT_COLUMNS: &str = r#"
    id, merchant_id, external_merchant_id, merchant_name, description,
    merchant_type, business_type, address, regex_patterns, created_at,
    modified_at, deleted, active
"#;

/// 商户仓储
pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Merchant>> {
        let merchant = sqlx::query_as::<_, Merchant>(&format!(
            "SELECT {MERCHANT_COLUMNS} FROM merchants WHERE id = $1 AND deleted = false"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(merchant)
    }

    pub async fn get_active_by_ids(&self, merchant_ids: &[String]) -> Result<Vec<Merchant>> {
        if merchant_ids.is_empty() {
            return Ok(vec![]);
        }

        let merchants = sqlx::query_as::<_, Merchant>(&format!(
            r#"
            SELECT {MERCHANT_COLUMNS} FROM merchants
            WHERE merchant_id = ANY($1) AND active = true AND deleted = false
            ORDER BY merchant_name ASC
            "#
        ))
        .bind(merchant_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(merchants)
    }
}

#[async_trait]
impl MerchantRepositoryTrait for MerchantRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Merchant>> {
        self.get_by_id(id).await
    }

    async fn get_active_by_ids(&self, merchant_ids: &[String]) -> Result<Vec<Merchant>> {
        self.get_active_by_ids(merchant_ids).await
    }
}

/// 商户正则仓储
///
/// 正则与商户同表存储，这里只读写 `regex_patterns` 投影
pub struct MerchantRegexRepository {
    pool: PgPool,
}

impl MerchantRegexRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 所有生效商户的正则列表
    pub async fn get_all(&self) -> Result<Vec<MerchantRegex>> {
        let regexes = sqlx::query_as::<_, MerchantRegex>(
            r#"
            SELECT id, regex_patterns FROM merchants
            WHERE active = true AND deleted = false AND cardinality(regex_patterns) > 0
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(regexes)
    }

    pub async fn replace_patterns(&self, regex: &MerchantRegex) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE merchants
            SET regex_patterns = $2, modified_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&regex.id)
        .bind(&regex.regex_patterns)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MerchantRegexRepositoryTrait for MerchantRegexRepository {
    async fn get_all(&self) -> Result<Vec<MerchantRegex>> {
        self.get_all().await
    }

    async fn replace_patterns(&self, regex: &MerchantRegex) -> Result<()> {
        self.replace_patterns(regex).await
    }
}

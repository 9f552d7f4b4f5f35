//! 商户实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 商户地址
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantAddress {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

/// 商户
///
/// 入站事件不携带唯一商户 ID，需要通过 `regex_patterns` 从商户名称识别
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: String,
    /// 内部商户 ID，促销通过它关联商户
    pub merchant_id: String,
    /// 外部内容系统中的商户 ID
    pub external_merchant_id: String,
    pub merchant_name: String,
    pub description: String,
    pub merchant_type: String,
    pub business_type: String,
    #[sqlx(json)]
    pub address: MerchantAddress,
    pub regex_patterns: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub active: bool,
}

/// 商户识别用的正则投影，整体缓存在一个键下
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MerchantRegex {
    /// 商户 ID
    pub id: String,
    pub regex_patterns: Vec<String>,
}

impl From<&Merchant> for MerchantRegex {
    fn from(merchant: &Merchant) -> Self {
        Self {
            id: merchant.id.clone(),
            regex_patterns: merchant.regex_patterns.clone(),
        }
    }
}

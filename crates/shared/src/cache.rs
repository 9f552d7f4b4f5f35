//! 缓存管理模块
//!
//! 提供 Redis 连接管理、进程内缓存实现以及读穿（read-through）缓存封装。
//! 缓存故障永远不会阻断业务：读写失败时降级到数据源并记录告警。

use crate::config::RedisConfig;
use crate::error::{PromoError, Result};
use crate::observability::metrics::record_cache_fallback;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 原始字符串缓存存储
///
/// 值统一以 JSON 字符串存放，便于在 Redis 与内存实现之间切换。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================================
// Redis 实现
// ============================================================================

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(PromoError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(PromoError::from)
    }
}

#[async_trait]
impl CacheStore for Cache {
    #[instrument(skip(self))]
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

// ============================================================================
// 内存实现
// ============================================================================

/// 进程内缓存，用于单实例部署和测试
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let hit = self
            .entries
            .get(key)
            .and_then(|entry| (entry.1 > now).then(|| entry.0.clone()));

        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(hit)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PromoError::Internal(format!("invalid cache ttl: {}", e)))?;
        self.entries
            .insert(key.to_string(), (value, Utc::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// 读穿缓存
// ============================================================================

/// 获取或加载（读穿缓存）
///
/// - 命中时直接反序列化返回
/// - 未命中时调用 loader，非空结果以固定 TTL 写回
/// - 缓存读写或反序列化失败时降级为直接调用 loader
///
/// 空结果（`null` 或空数组）不会被缓存，避免把瞬时的空数据固化 TTL 时长。
/// 缓存自身的错误不会返回给调用方，因此错误类型只取决于 loader。
pub async fn get_or_load<T, E, F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    loader: F,
) -> std::result::Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    match store.get_raw(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!(key = %key, "缓存命中");
                return Ok(value);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "缓存内容反序列化失败，回源加载");
                record_cache_fallback("deserialize");
            }
        },
        Ok(None) => {}
        Err(e) => {
            warn!(key = %key, error = %e, "读取缓存失败，回源加载");
            record_cache_fallback("get");
        }
    }

    let value = loader().await?;

    match serde_json::to_string(&value) {
        Ok(serialized) if is_empty_payload(&serialized) => {
            debug!(key = %key, "加载结果为空，跳过缓存");
        }
        Ok(serialized) => {
            if let Err(e) = store.set_raw(key, serialized, ttl).await {
                warn!(key = %key, error = %e, "写入缓存失败");
                record_cache_fallback("set");
            }
        }
        Err(e) => {
            warn!(key = %key, error = %e, "缓存序列化失败");
        }
    }

    Ok(value)
}

/// 失效缓存键，失败只记录日志
pub async fn invalidate(store: &dyn CacheStore, key: &str) {
    match store.delete(key).await {
        Ok(()) => debug!(key = %key, "缓存已失效"),
        Err(e) => {
            warn!(key = %key, error = %e, "缓存失效失败");
            record_cache_fallback("delete");
        }
    }
}

fn is_empty_payload(serialized: &str) -> bool {
    matches!(serialized, "null" | "[]" | "{}" | "\"\"")
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    /// 商户识别正则列表
    pub fn merchant_regex_lookup() -> String {
        "MerchantRegexLookupCacheKey".to_string()
    }

    /// App 端展示的促销列表
    pub fn app_offers() -> String {
        "PromotionsForAppOffersWorkflow".to_string()
    }

    pub fn merchant(merchant_id: &str) -> String {
        format!("merchant:{}", merchant_id)
    }

    pub fn promotion(promotion_id: &str) -> String {
        format!("promotion:{}", promotion_id)
    }
}

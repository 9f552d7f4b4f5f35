//! 订单奖励账本仓储
//!
//! 每个订单一行，交易流水以 JSONB 数组存储

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use super::traits::LedgerRepositoryTrait;
use crate::error::Result;
use crate::models::CustomerOrderRewardsLedger;

/// 订单奖励账本仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_for_order(&self, order_id: &str) -> Result<Option<CustomerOrderRewardsLedger>> {
        let ledger = sqlx::query_as::<_, CustomerOrderRewardsLedger>(
            r#"
            SELECT order_id, customer_id, merchant, promotion, reward_balance,
                   transactions, pending, created_at, modified_at
            FROM customer_order_rewards_ledgers
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ledger)
    }

    /// 以订单 ID 为键写入账本（存在则覆盖）
    #[instrument(skip(self, ledger), fields(order_id = %ledger.order_id))]
    pub async fn upsert(&self, ledger: &CustomerOrderRewardsLedger) -> Result<CustomerOrderRewardsLedger> {
        let saved = sqlx::query_as::<_, CustomerOrderRewardsLedger>(
            r#"
            INSERT INTO customer_order_rewards_ledgers
                (order_id, customer_id, merchant, promotion, reward_balance,
                 transactions, pending, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_id) DO UPDATE SET
                reward_balance = EXCLUDED.reward_balance,
                transactions = EXCLUDED.transactions,
                pending = EXCLUDED.pending,
                modified_at = NOW()
            RETURNING order_id, customer_id, merchant, promotion, reward_balance,
                      transactions, pending, created_at, modified_at
            "#,
        )
        .bind(&ledger.order_id)
        .bind(&ledger.customer_id)
        .bind(Json(&ledger.merchant))
        .bind(Json(&ledger.promotion))
        .bind(ledger.reward_balance)
        .bind(Json(&ledger.transactions))
        .bind(Json(&ledger.pending))
        .bind(ledger.created_at)
        .bind(ledger.modified_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn get_for_order(&self, order_id: &str) -> Result<Option<CustomerOrderRewardsLedger>> {
        self.get_for_order(order_id).await
    }

    async fn create(
        &self,
        ledger: &CustomerOrderRewardsLedger,
    ) -> Result<CustomerOrderRewardsLedger> {
        self.upsert(ledger).await
    }

    async fn update(
        &self,
        ledger: &CustomerOrderRewardsLedger,
    ) -> Result<CustomerOrderRewardsLedger> {
        self.upsert(ledger).await
    }
}

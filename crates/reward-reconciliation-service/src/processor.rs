//! 交易消息处理器
//!
//! 解码交易 topic 上的消息并交给对账处理器。

use std::sync::Arc;

use async_trait::async_trait;
use promo_shared::kafka::ConsumerMessage;
use tracing::{info, warn};

use crate::commands::LifecycleCommand;
use crate::error::Result;
use crate::messages::decode_command;
use crate::orchestrator::{ReconciliationOrchestrator, ReconciliationOutcome};

/// 生命周期命令处理接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(&self, command: &LifecycleCommand) -> Result<ReconciliationOutcome>;
}

#[async_trait]
impl LifecycleHandler for ReconciliationOrchestrator {
    async fn handle(&self, command: &LifecycleCommand) -> Result<ReconciliationOutcome> {
        ReconciliationOrchestrator::handle(self, command).await
    }
}

/// 交易消息处理器
pub struct TransactionProcessor {
    handler: Arc<dyn LifecycleHandler>,
}

impl TransactionProcessor {
    pub fn new(handler: Arc<dyn LifecycleHandler>) -> Self {
        Self { handler }
    }

    /// 处理单条交易消息
    pub async fn process(&self, msg: &ConsumerMessage) -> Result<ReconciliationOutcome> {
        let command = decode_command(msg).inspect_err(|e| {
            warn!(
                key = ?msg.key,
                offset = msg.offset,
                error = %e,
                "交易消息解码失败"
            );
        })?;

        let outcome = self.handler.handle(&command).await?;
        info!(
            order_id = %command.order_id(),
            transaction_type = %command.transaction_type(),
            outcome = outcome.as_str(),
            "交易消息处理完成"
        );
        Ok(outcome)
    }
}

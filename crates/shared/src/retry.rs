//! 指数退避重试
//!
//! 只处理瞬时故障：连接抖动、Kafka 投递失败、汇总版本冲突耗尽等。
//! 是否可重试由调用方传入的判定函数决定，输入错误应当直接失败。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ReconciliationConfig;

/// 退避参数
///
/// 第 n 次重试前等待 `initial_delay * multiplier^n`，不超过 `max_delay`。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次执行之外的最大重试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 单条交易消息的进程内重试，间隔较短，重试次数取自配置
    pub fn for_messages(config: &ReconciliationConfig) -> Self {
        Self {
            max_retries: config.message_max_retries,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// `failures` 为已失败的重试轮次
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// 按策略执行异步操作
///
/// 不可重试的错误与耗尽重试后的最后一个错误原样返回。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failures: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(operation = operation_name, failures, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!(operation = operation_name, error = %err, "不可重试的错误");
            return Err(err);
        }
        if !policy.should_retry(failures) {
            warn!(
                operation = operation_name,
                max_retries = policy.max_retries,
                error = %err,
                "重试次数已耗尽"
            );
            return Err(err);
        }

        let delay = policy.delay_for_attempt(failures);
        warn!(
            operation = operation_name,
            failures,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "瞬时故障，退避后重试"
        );
        tokio::time::sleep(delay).await;
        failures += 1;
    }
}

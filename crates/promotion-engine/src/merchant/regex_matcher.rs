//! 有界正则匹配
//!
//! 商户正则来自运营配置，不可信。每次匹配都限制编译体积并设置超时，
//! 无效或超时的正则一律按“未匹配”处理。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// 单个正则编译后允许的最大体积
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 有界正则匹配器
///
/// 编译结果按模式串缓存，无效模式也会缓存，避免重复编译和重复告警。
pub struct BoundedRegexMatcher {
    timeout: Duration,
    compiled: Mutex<HashMap<String, Option<Regex>>>,
}

impl BoundedRegexMatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    fn compile(&self, pattern: &str) -> Option<Regex> {
        let mut compiled = self.compiled.lock();
        if let Some(cached) = compiled.get(pattern) {
            return cached.clone();
        }

        let regex = match RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
        {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "商户正则无效，按未匹配处理");
                None
            }
        };
        compiled.insert(pattern.to_string(), regex.clone());
        regex
    }

    /// 判断文本是否匹配模式
    pub async fn is_match(&self, pattern: &str, text: &str) -> bool {
        let Some(regex) = self.compile(pattern) else {
            return false;
        };

        let input = text.to_string();
        let task = tokio::task::spawn_blocking(move || regex.is_match(&input));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                warn!(pattern = %pattern, error = %e, "正则匹配任务异常，按未匹配处理");
                false
            }
            Err(_) => {
                warn!(
                    pattern = %pattern,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "正则匹配超时，按未匹配处理"
                );
                false
            }
        }
    }

    /// 任一模式匹配即返回 true
    pub async fn matches_any(&self, patterns: &[String], text: &str) -> bool {
        for pattern in patterns {
            if self.is_match(pattern, text).await {
                return true;
            }
        }
        false
    }
}

//! 促销引擎
//!
//! 订单奖励对账的领域层，提供：
//! - 促销、汇总、账本、商户等领域模型
//! - 促销资格规则评估与奖励计算
//! - 仓储接口及 Postgres 实现
//! - 商户识别（有界正则匹配）与缓存维护
//! - 收银台 / App 优惠查询

pub mod calculator;
pub mod error;
pub mod merchant;
pub mod models;
pub mod offers;
pub mod repository;
pub mod rules;
pub mod test_utils;

pub use calculator::{calculate_reward, find_largest_reward, select_largest_reward};
pub use error::{EngineError, Result};
pub use rules::{PromotionRulesEvaluator, ValidPromotion};

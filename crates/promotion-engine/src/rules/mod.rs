//! 促销资格规则
//!
//! - `default_rules`: 与汇总无关的单笔订单检查
//! - `summary_rules`: 基于汇总计数的总量上限检查
//! - `evaluator`: 组合两阶段评估，筛选合格促销

mod default_rules;
mod evaluator;
mod summary_rules;

pub use default_rules::evaluate_default_rules;
pub use evaluator::{PromotionRulesEvaluator, ValidPromotion};
pub use summary_rules::evaluate_summary_rules;

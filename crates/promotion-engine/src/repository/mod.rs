//! 数据库仓储层
//!
//! 提供促销、汇总、账本、商户的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 写入以主键做 upsert，促销与汇总按版本号比较后写入
//! - 定义 trait 接口以支持 mock 测试和内存实现

mod ledger_repo;
mod merchant_repo;
mod promotion_repo;
mod summary_repo;
mod traits;

pub use ledger_repo::LedgerRepository;
pub use merchant_repo::{MerchantRegexRepository, MerchantRepository};
pub use promotion_repo::PromotionRepository;
pub use summary_repo::PromotionSummaryRepository;
pub use traits::*;

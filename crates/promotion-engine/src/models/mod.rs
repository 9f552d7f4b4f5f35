//! 促销领域模型定义

mod enums;
mod ledger;
mod merchant;
mod promotion;
mod reward;

pub use enums::*;
pub use ledger::*;
pub use merchant::*;
pub use promotion::*;
pub use reward::*;

//! 商户识别与正则缓存维护

mod identification;
mod regex_cache;
mod regex_matcher;

pub use identification::{MerchantIdentificationService, MerchantIdentifier};
pub use regex_cache::MerchantRegexCacheManager;
pub use regex_matcher::BoundedRegexMatcher;

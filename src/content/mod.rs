//! Content Module
//! Mission: Cached portfolio content with change detection

pub mod cache;
pub mod chat;
pub mod models;

pub use cache::{CacheSubscription, ContentCache, ContentSnapshot};
pub use chat::ChatClient;
pub use models::{PortfolioData, SiteCopy};

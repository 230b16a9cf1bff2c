//! Scholia cache layer.
//!
//! - **Lookup caches**: single-flight, TTL-bound caches for category trees and counts
//! - **Feed store**: bounded LRU of rendered Atom documents
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! taxonomy_ttl_seconds = 86400
//! feed_enabled = true
//! feed_limit = 200
//! feed_ttl_seconds = 3600
//! ```

mod config;
pub mod keys;
mod lock;
mod lookup;
mod store;

pub use config::CacheConfig;
pub use keys::{
    FeedCacheKey, FeedKeyParams, categories_key, category_count_key, top_and_second_level_key,
};
pub use lookup::LookupCache;
pub use store::FeedStore;

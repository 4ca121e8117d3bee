//! Cache types for Supabase lookups.

use std::time::Duration;

use moka::future::Cache;
use venthub_core::ProductId;

use super::types::PriceInfo;

/// Cache key for backend lookups.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Price(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone, Copy)]
pub enum CacheValue {
    Price(PriceInfo),
}

/// Build the lookup cache (5 minute TTL).
pub fn build() -> Cache<CacheKey, CacheValue> {
    Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300))
        .build()
}

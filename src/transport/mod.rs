//! Resilient transport shared by every provider adapter.
//!
//! Every network call in the crate flows through this layer so that retry,
//! rate-limit, circuit-breaking, and cache policy stay uniform. Transport has
//! no knowledge of routing; routing reaches it only through the adapter
//! interface.

pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod rate_limit;
pub mod retry;

pub use cache::{
    cache_key_for_request, ttl_for_category, CacheBackend, CacheManager, FileCache, MemoryCache,
};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use http::{HttpSession, RequestMetric};
pub use rate_limit::{HostRateLimiters, RateLimiter};
pub use retry::{retry_async, RetryConfig};

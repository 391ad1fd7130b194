//! Rate limiting logic and state management.

mod identity;
mod limiter;
mod policy;
mod store;

pub use identity::{caller_identity, UNKNOWN_IDENTITY};
pub use limiter::{Decision, RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use policy::{parse_window, PolicyConfig, PolicySet, RateLimitPolicy};
pub use store::{CounterStore, MemoryStore, RedisStore, WindowCount};

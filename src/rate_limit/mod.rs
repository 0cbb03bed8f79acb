pub mod limiter;
pub mod types;

pub use limiter::RateLimiter;
pub use types::{Quota, RateLimitConfig, RateLimitDecision, RouteLimit};

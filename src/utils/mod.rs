pub mod error;
pub mod rate_limit;

pub use error::{Result, SpecError};
pub use rate_limit::RateLimiter;

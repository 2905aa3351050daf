//! Shared configuration types for flowkit components.

mod base;
mod error_group;
mod rate_limiter;
mod stream;
mod toolkit;

pub use base::ValidationError;
pub use error_group::ErrorGroupConfig;
pub use rate_limiter::RateLimiterConfig;
pub use stream::{LagPolicy, SplitConfig, SplitMode, StreamConfig};
pub use toolkit::ToolkitConfig;

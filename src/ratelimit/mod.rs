//! Rate limiting policies and the decision engine.

mod limiter;
mod policy;

pub use limiter::{RateLimiter, TwoStepCounter};
pub use policy::{Decision, Enforcement, Policy, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS, MAX_WINDOW};

//! Rate limiting logic: window math, counter keys and the sliding window limiter.

mod backend;
mod clock;
mod key;
mod rules;
mod sliding;
mod window;

pub use backend::RateLimiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CounterKey;
pub use rules::RouteLimits;
pub use sliding::{SlidingWindowLimiter, DEFAULT_KEY_PREFIX};
pub use window::{previous_weight, validate_window, WindowPosition};

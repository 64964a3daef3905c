//! Rate limit accounting: windows, keys and the two interchangeable backends.

mod backend;
mod clock;
mod dispatch;
mod distributed;
mod key;
mod limiter;
mod window;


pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{BackendKind, ChannelRateLimiter};
pub use distributed::RemoteRateLimiter;
pub use key::{ChannelModelKey, RPD_PREFIX, RPM_PREFIX, TPM_PREFIX};
pub use limiter::MemoryRateLimiter;
pub use window::{
    Dimension, FixedWindowCounter, Limits, SlidingWindow, Usage, DAY_SECS,
    DEFAULT_RPM_HISTORY_CAP, MINUTE_SECS,
};

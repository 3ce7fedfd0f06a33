//! Stream combinators for snapshot feeds

mod throttle;

pub use throttle::{Throttle, ThrottleExt};

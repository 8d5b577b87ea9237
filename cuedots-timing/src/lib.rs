pub mod timer;
pub mod waiter;

pub use timer::{Clock, FrameIntervals, FrameStats, HighPrecisionTimer};
pub use waiter::{Completion, StaticPeriod};

pub mod phase;
pub mod stimulus;
pub mod trial;

pub use phase::Phase;
pub use stimulus::{Scene, Shape, Task};
pub use trial::{CompletedTrial, CoreError, Key, KeyPress, TrialRecord, TrialSpec};

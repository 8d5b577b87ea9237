pub mod config;
pub mod design;
pub mod devices;
pub mod error;
pub mod rig;
pub mod sequencer;
pub mod session;
pub mod sink;

pub use config::{ConfigError, ExperimentConfig, TaskMode};
pub use design::{CsvDesign, DesignError};
pub use devices::{DeviceError, InputPoller, Marker, MarkerSink, RecordSink, Renderer, Tracker};
pub use error::EngineError;
pub use rig::{Rig, Teardown};
pub use sequencer::{TrialOutcome, TrialSequencer};
pub use session::{EndReason, SessionController, SessionSummary};
pub use sink::{JsonLinesSink, MarkerLog};

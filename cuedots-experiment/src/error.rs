use cuedots_core::CoreError;

use crate::design::DesignError;
use crate::devices::DeviceError;

/// Conditions that end a session early. Timing overruns never show up here;
/// they only shorten a recorded phase.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("design could not be read")]
    Design(#[from] DesignError),

    #[error("renderer failed")]
    Render(#[source] DeviceError),

    #[error("input device failed")]
    Input(#[source] DeviceError),

    #[error("marker stream failed")]
    Markers(#[source] DeviceError),

    #[error("record sink failed")]
    Sink(#[source] DeviceError),

    #[error("trial record rejected a timestamp")]
    Record(#[from] CoreError),

    #[error("teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),
}

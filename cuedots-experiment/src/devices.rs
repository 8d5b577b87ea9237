//! Seams to the hardware and storage the engine drives.
//!
//! Every call here happens on the session thread. Calls may block (a flip
//! waits for the next refresh, a record append may wait on storage) but none
//! of them is cancelled from the engine's side.

use cuedots_core::{CompletedTrial, Key, KeyPress, Scene};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("input device disconnected")]
    Disconnected,

    #[error("display was closed")]
    DisplayClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not encode record")]
    Encode(#[from] serde_json::Error),

    #[error("{device}: {message}")]
    Backend {
        device: &'static str,
        message: String,
    },
}

impl DeviceError {
    pub fn backend(device: &'static str, message: impl std::fmt::Display) -> Self {
        DeviceError::Backend {
            device,
            message: message.to_string(),
        }
    }
}

/// Presents scenes. `flip` returns the session-clock time, in seconds, at
/// which the frame became visible.
pub trait Renderer {
    fn flip(&mut self, scene: &Scene<'_>) -> Result<f64, DeviceError>;
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Keyboard (or button box) event queue.
pub trait InputPoller {
    /// Drops everything queued so far.
    fn clear_events(&mut self) -> Result<(), DeviceError>;

    /// Drains the queue without blocking, returning presses of `keys` in
    /// arrival order. Presses of other keys are discarded.
    fn get_presses(&mut self, keys: &[Key]) -> Result<Vec<KeyPress>, DeviceError>;

    /// Blocks until one of `keys` is pressed.
    fn wait_for_press(&mut self, keys: &[Key]) -> Result<KeyPress, DeviceError>;

    fn disconnect(&mut self) -> Result<(), DeviceError>;
}

/// Timestamped annotation sent alongside a flip so the frame can be lined up
/// with external device logs afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker<'a> {
    pub category: &'a str,
    pub trial: u32,
    pub frame: usize,
    pub time: f64,
}

impl Marker<'_> {
    pub fn message(&self) -> String {
        format!("{:.8}", self.time)
    }
}

pub trait MarkerSink {
    fn send(&mut self, marker: &Marker<'_>) -> Result<(), DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Append-only destination for finished trials. `append` may block.
pub trait RecordSink {
    fn append(&mut self, trial: CompletedTrial) -> Result<(), DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// External recorder (eye tracker, physiology amplifier) that has to be
/// stopped when the session ends.
pub trait Tracker {
    fn stop(&mut self) -> Result<(), DeviceError>;
}

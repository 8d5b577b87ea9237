use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::stimulus::{Shape, Task};

/// One row of the design: everything needed to present a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    #[serde(rename = "sub")]
    pub subject: u32,
    pub block: u32,
    pub trial: u32,
    /// Dot motion direction in degrees; positive is leftward-judged.
    pub direction: f64,
    /// Hue angle in degrees.
    pub hue: f64,
    pub chroma: f64,
    pub lightness: f64,
    pub shape: Shape,
    pub rgb: [u8; 3],
}

impl TrialSpec {
    pub fn task(&self) -> Task {
        self.shape.task()
    }

    /// True when `next` belongs to a different block than `self`.
    pub fn starts_new_block(&self, next: &TrialSpec) -> bool {
        self.block != next.block
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Left,
    Right,
    Escape,
    Space,
}

impl Key {
    pub const RESPONSES: [Key; 3] = [Key::Left, Key::Right, Key::Escape];

    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Left => "left",
            Key::Right => "right",
            Key::Escape => "escape",
            Key::Space => "space",
        }
    }
}

/// A key press with the time (seconds on the session clock) the device saw it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: Key,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("{0} start was already stamped for this trial")]
    AlreadyStamped(Phase),

    #[error("{0} is not a stamped trial boundary")]
    NotABoundary(Phase),

    #[error("{phase} stamped at {at:.6}s, before the previous boundary at {previous:.6}s")]
    OutOfOrder { phase: Phase, at: f64, previous: f64 },

    #[error("a response was already captured for this trial")]
    DuplicateResponse,

    #[error("stimulus phase has not ended yet")]
    StimulusNotEnded,
}

/// Timestamps and response of a trial in progress. All times are seconds on
/// the session clock; `None` means the boundary has not happened (yet).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub fix_start: Option<f64>,
    pub cue_start: Option<f64>,
    pub dots_start: Option<f64>,
    pub dots_end: Option<f64>,
    pub response_time: Option<f64>,
    pub response_key: Option<Key>,
    pub correct: Option<bool>,
    pub feedback_start: Option<f64>,
}

impl TrialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the flip that opened `phase`.
    pub fn stamp(&mut self, phase: Phase, at: f64) -> Result<(), CoreError> {
        let previous = self.latest();
        let slot = match phase {
            Phase::Fixation => &mut self.fix_start,
            Phase::Cue => &mut self.cue_start,
            Phase::Stimulus => &mut self.dots_start,
            Phase::Feedback => &mut self.feedback_start,
            Phase::InterTrialInterval | Phase::Rest => return Err(CoreError::NotABoundary(phase)),
        };
        if slot.is_some() {
            return Err(CoreError::AlreadyStamped(phase));
        }
        if let Some(previous) = previous {
            if at < previous {
                return Err(CoreError::OutOfOrder { phase, at, previous });
            }
        }
        *slot = Some(at);
        Ok(())
    }

    /// Stamps the last stimulus flip.
    pub fn end_stimulus(&mut self, at: f64) -> Result<(), CoreError> {
        let Some(start) = self.dots_start else {
            return Err(CoreError::NotABoundary(Phase::Stimulus));
        };
        if self.dots_end.is_some() {
            return Err(CoreError::AlreadyStamped(Phase::Stimulus));
        }
        if at < start {
            return Err(CoreError::OutOfOrder {
                phase: Phase::Stimulus,
                at,
                previous: start,
            });
        }
        self.dots_end = Some(at);
        Ok(())
    }

    pub fn record_response(&mut self, press: KeyPress) -> Result<(), CoreError> {
        if self.response_key.is_some() {
            return Err(CoreError::DuplicateResponse);
        }
        self.response_key = Some(press.key);
        self.response_time = Some(press.time);
        Ok(())
    }

    /// Scores the trial. Only valid once the stimulus phase has ended; a trial
    /// without a response stays unscored.
    pub fn score(&mut self, spec: &TrialSpec, neutral_hue: f64) -> Result<(), CoreError> {
        if self.dots_end.is_none() {
            return Err(CoreError::StimulusNotEnded);
        }
        self.correct = self
            .response_key
            .map(|key| spec.task().judge(key, spec, neutral_hue));
        Ok(())
    }

    pub fn is_correct(&self) -> bool {
        self.correct.unwrap_or(false)
    }

    /// Freezes the record together with its spec.
    pub fn seal(self, spec: TrialSpec) -> CompletedTrial {
        CompletedTrial { spec, record: self }
    }

    fn latest(&self) -> Option<f64> {
        [
            self.fix_start,
            self.cue_start,
            self.dots_start,
            self.dots_end,
            self.feedback_start,
        ]
        .into_iter()
        .flatten()
        .reduce(f64::max)
    }
}

/// A finished trial. Fields are only readable; the value is moved into the
/// record sink and never handed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTrial {
    #[serde(flatten)]
    spec: TrialSpec,
    #[serde(flatten)]
    record: TrialRecord,
}

impl CompletedTrial {
    pub fn spec(&self) -> &TrialSpec {
        &self.spec
    }

    pub fn record(&self) -> &TrialRecord {
        &self.record
    }
}

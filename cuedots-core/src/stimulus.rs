use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::trial::{Key, TrialSpec};

/// Cue shape named in the design. Written lowercase, read in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Shape {
    Triangle,
    Circle,
    Cross,
    Fleur,
}

impl Shape {
    pub const ALL: [Shape; 4] = [Shape::Triangle, Shape::Circle, Shape::Cross, Shape::Fleur];

    pub fn task(&self) -> Task {
        Task::for_shape(*self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Triangle => "triangle",
            Shape::Circle => "circle",
            Shape::Cross => "cross",
            Shape::Fleur => "fleur",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cue shape {0:?}")]
pub struct UnknownShape(pub String);

impl FromStr for Shape {
    type Err = UnknownShape;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownShape(s.to_string()))
    }
}

impl TryFrom<String> for Shape {
    type Error = UnknownShape;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Which dimension of the dot field the participant judges.
///
/// Resolved once from the cue shape: triangle and circle cue the color task,
/// cross and fleur cue the motion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Color,
    Motion,
}

impl Task {
    pub fn for_shape(shape: Shape) -> Self {
        match shape {
            Shape::Triangle | Shape::Circle => Task::Color,
            Shape::Cross | Shape::Fleur => Task::Motion,
        }
    }

    /// Correctness of `key` for `spec`.
    ///
    /// Both sides of the neutral point are inclusive, so a hue exactly at
    /// `neutral_hue` (or a direction of exactly 0) accepts either key.
    /// Escape and any non-response key are never correct.
    pub fn judge(&self, key: Key, spec: &TrialSpec, neutral_hue: f64) -> bool {
        match (self, key) {
            (Task::Color, Key::Left) => spec.hue <= neutral_hue,
            (Task::Color, Key::Right) => spec.hue >= neutral_hue,
            (Task::Motion, Key::Left) => spec.direction >= 0.0,
            (Task::Motion, Key::Right) => spec.direction <= 0.0,
            (_, Key::Escape | Key::Space) => false,
        }
    }
}

/// A frame the renderer is asked to present.
///
/// `Cue` and `Stimulus` are drawn on top of the fixation point.
#[derive(Debug, Clone, PartialEq)]
pub enum Scene<'a> {
    Blank,
    Fixation,
    Cue {
        shape: Shape,
    },
    Stimulus {
        direction: f64,
        rgb: [u8; 3],
        frame: usize,
    },
    Feedback {
        correct: bool,
    },
    Text {
        body: &'a str,
    },
}

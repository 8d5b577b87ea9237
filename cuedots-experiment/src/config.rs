use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use cuedots_core::Key;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which part of the session to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Quick check of the setup: no instructions, first few trials only.
    Test,
    /// Instructions followed by the first block as practice.
    Instruct,
    /// Instructions followed by the whole design.
    #[default]
    Main,
}

impl TaskMode {
    pub fn shows_instructions(&self) -> bool {
        !matches!(self, TaskMode::Test)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Test => "test",
            TaskMode::Instruct => "instruct",
            TaskMode::Main => "main",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(TaskMode::Test),
            "instruct" => Ok(TaskMode::Instruct),
            "main" => Ok(TaskMode::Main),
            other => Err(ConfigError::Invalid(format!("unknown task mode {other:?}"))),
        }
    }
}

/// Reads a TOML config file into `T`. Validation is left to the caller.
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Timing and wording of a session. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub fixation_s: f64,
    pub cue_s: f64,
    pub stimulus_s: f64,
    pub feedback_s: f64,
    pub inter_trial_s: f64,
    /// Nominal display refresh rate, used for the stimulus frame count and to
    /// lead every static period by one frame.
    pub refresh_hz: f64,
    /// Hue angle separating "left" from "right" answers in the color task.
    pub neutral_hue: f64,
    pub continue_key: Key,
    /// Trials run in [`TaskMode::Test`].
    pub test_trials: usize,
    pub instructions: String,
    pub rest_text: String,
    pub correct_text: String,
    pub incorrect_text: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            fixation_s: 0.5,
            cue_s: 1.0,
            stimulus_s: 1.0,
            feedback_s: 0.5,
            inter_trial_s: 0.5,
            refresh_hz: 60.0,
            neutral_hue: 90.0,
            continue_key: Key::Space,
            test_trials: 8,
            instructions: "Triangle or circle: judge the color of the dots.\n\
                           Cross or fleur: judge their direction of motion.\n\
                           Answer with LEFT or RIGHT. Press SPACE to start."
                .to_string(),
            rest_text: "Take a short break.\nPress SPACE to continue.".to_string(),
            correct_text: "CORRECT".to_string(),
            incorrect_text: "INCORRECT".to_string(),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("fixation_s", self.fixation_s),
            ("cue_s", self.cue_s),
            ("stimulus_s", self.stimulus_s),
            ("feedback_s", self.feedback_s),
            ("inter_trial_s", self.inter_trial_s),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if !self.refresh_hz.is_finite() || self.refresh_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "refresh_hz must be positive, got {}",
                self.refresh_hz
            )));
        }
        if self.stimulus_frames() == 0 {
            return Err(ConfigError::Invalid(format!(
                "stimulus_s = {} is shorter than one frame at {} Hz",
                self.stimulus_s, self.refresh_hz
            )));
        }
        if matches!(self.continue_key, Key::Left | Key::Right | Key::Escape) {
            return Err(ConfigError::Invalid(format!(
                "continue_key cannot be a response key ({})",
                self.continue_key.as_str()
            )));
        }
        Ok(())
    }

    /// Frames in the stimulus loop. The product is truncated, not rounded, so
    /// a duration that lands a hair under a whole frame count loses that frame.
    pub fn stimulus_frames(&self) -> usize {
        (self.stimulus_s * self.refresh_hz).trunc() as usize
    }

    pub fn fixation(&self) -> Duration {
        Duration::from_secs_f64(self.fixation_s)
    }

    pub fn cue(&self) -> Duration {
        Duration::from_secs_f64(self.cue_s)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_secs_f64(self.feedback_s)
    }

    pub fn inter_trial(&self) -> Duration {
        Duration::from_secs_f64(self.inter_trial_s)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz)
    }

    pub fn feedback_text(&self, correct: bool) -> &str {
        if correct {
            &self.correct_text
        } else {
            &self.incorrect_text
        }
    }
}

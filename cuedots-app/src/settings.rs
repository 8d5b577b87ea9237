use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use cuedots_experiment::config::read_toml;
use cuedots_experiment::{ExperimentConfig, TaskMode};
use cuedots_render::RenderConfig;
use serde::{Deserialize, Serialize};

/// Contents of the optional `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub experiment: ExperimentConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = match path {
            Some(path) => read_toml(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Self::default(),
        };
        config.experiment.validate()?;
        Ok(config)
    }
}

/// Files one run writes, all under the output directory and prefixed with
/// the subject and run numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub trials: PathBuf,
    pub markers: PathBuf,
    pub session: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, subject: u32, run: u32) -> Self {
        let stem = format!("sub-{subject:03}_run-{run:03}");
        Self {
            trials: dir.join(format!("{stem}_trials.jsonl")),
            markers: dir.join(format!("{stem}_markers.tsv")),
            session: dir.join(format!("{stem}_session.json")),
        }
    }
}

/// Written once before the first trial.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub subject: u32,
    pub run: u32,
    pub mode: TaskMode,
    pub demographics: bool,
    pub version: &'static str,
    pub started: DateTime<Local>,
    pub design: PathBuf,
    pub reported_refresh_hz: Option<f64>,
    pub config: ExperimentConfig,
}

impl SessionInfo {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

use cuedots_core::{Key, KeyPress, Phase, Scene, TrialSpec};
use cuedots_timing::{Clock, FrameIntervals, StaticPeriod};

use crate::config::{ExperimentConfig, TaskMode};
use crate::design::DesignError;
use crate::devices::{InputPoller, MarkerSink, RecordSink, Renderer};
use crate::error::EngineError;
use crate::rig::Rig;
use crate::sequencer::{TrialSequencer, flip};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The design (or the part of it the task mode runs) was exhausted.
    Completed,
    /// The participant pressed escape.
    Aborted,
}

/// Where the session is. A user abort is tracked here; error aborts travel
/// as `Err` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionState {
    current_block: Option<u32>,
    first_block: Option<u32>,
    /// Trials run so far.
    cursor: usize,
    user_abort: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub end: EndReason,
    pub trials_run: usize,
    pub correct: usize,
    pub rest_breaks: usize,
    /// Waits that ended late, e.g. behind a slow record sink.
    pub overruns: usize,
}

pub struct SessionController<C: Clock> {
    config: ExperimentConfig,
    mode: TaskMode,
    waiter: StaticPeriod<C>,
    intervals: FrameIntervals,
    state: SessionState,
    correct: usize,
    rest_breaks: usize,
    overruns: usize,
}

impl<C: Clock> SessionController<C> {
    pub fn new(config: ExperimentConfig, mode: TaskMode, clock: C) -> Self {
        let waiter = StaticPeriod::for_refresh_rate(clock, config.refresh_hz);
        Self {
            config,
            mode,
            waiter,
            intervals: FrameIntervals::default(),
            state: SessionState::default(),
            correct: 0,
            rest_breaks: 0,
            overruns: 0,
        }
    }

    /// Runs the session and releases the rig on every way out. A failure
    /// during the run wins over a failure during teardown.
    pub fn run<R, I, M, S, D>(
        &mut self,
        rig: &mut Rig<R, I, M, S>,
        design: D,
    ) -> Result<SessionSummary, EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
        D: IntoIterator<Item = Result<TrialSpec, DesignError>>,
    {
        tracing::info!(mode = %self.mode, "session started");
        let result = self.run_trials(rig, design);
        let teardown = rig.release();

        match result {
            Ok(summary) if teardown.is_clean() => {
                tracing::info!(
                    end = ?summary.end,
                    trials = summary.trials_run,
                    correct = summary.correct,
                    overruns = summary.overruns,
                    "session finished"
                );
                Ok(summary)
            }
            Ok(_) => Err(EngineError::Teardown(teardown.describe())),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    trials = self.state.cursor,
                    block = ?self.state.current_block,
                    "session aborted"
                );
                Err(err)
            }
        }
    }

    fn run_trials<R, I, M, S, D>(
        &mut self,
        rig: &mut Rig<R, I, M, S>,
        design: D,
    ) -> Result<SessionSummary, EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
        D: IntoIterator<Item = Result<TrialSpec, DesignError>>,
    {
        if self.mode.shows_instructions() {
            let body = self.config.instructions.clone();
            if self.screen(rig, &body)?.key == Key::Escape {
                return Ok(self.abort());
            }
        }

        let mut design = design.into_iter().peekable();
        while let Some(spec) = design.next() {
            let spec = spec?;
            if !self.in_scope(&spec) {
                break;
            }
            if self.state.first_block.is_none() {
                self.state.first_block = Some(spec.block);
            }
            self.state.current_block = Some(spec.block);

            let outcome = TrialSequencer::new(&self.config, &mut self.waiter, &mut self.intervals)
                .run(rig, &spec)?;
            self.state.cursor += 1;
            self.overruns += outcome.overruns;
            if outcome.correct == Some(true) {
                self.correct += 1;
            }
            if outcome.escaped() {
                return Ok(self.abort());
            }

            let next_block = match design.peek() {
                None => break,
                Some(Ok(next)) if self.in_scope(next) => {
                    spec.starts_new_block(next).then_some(next.block)
                }
                Some(Ok(_)) => break,
                // The error surfaces when the row is pulled.
                Some(Err(_)) => None,
            };

            if let Some(block) = next_block {
                tracing::info!(finished = spec.block, next = block, "rest break");
                self.rest_breaks += 1;
                let body = self.config.rest_text.clone();
                if self.screen(rig, &body)?.key == Key::Escape {
                    return Ok(self.abort());
                }
            }
            self.inter_trial_interval(rig)?;
        }

        Ok(self.summary())
    }

    fn in_scope(&self, next: &TrialSpec) -> bool {
        match self.mode {
            TaskMode::Main => true,
            TaskMode::Instruct => self.state.first_block.is_none_or(|b| b == next.block),
            TaskMode::Test => self.state.cursor < self.config.test_trials,
        }
    }

    /// Text screen that waits, without limit, for the continue key or escape.
    fn screen<R, I, M, S>(&mut self, rig: &mut Rig<R, I, M, S>, body: &str) -> Result<KeyPress, EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
    {
        self.settle();
        flip(rig, &Scene::Text { body })?;
        rig.input.clear_events().map_err(EngineError::Input)?;
        let press = rig
            .input
            .wait_for_press(&[self.config.continue_key, Key::Escape])
            .map_err(EngineError::Input)?;
        tracing::debug!(key = press.key.as_str(), "screen dismissed");
        Ok(press)
    }

    fn inter_trial_interval<R, I, M, S>(&mut self, rig: &mut Rig<R, I, M, S>) -> Result<(), EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
    {
        self.settle();
        flip(rig, &Scene::Blank)?;
        self.waiter.start(self.config.inter_trial());
        tracing::trace!(phase = %Phase::InterTrialInterval, "started");
        Ok(())
    }

    fn settle(&mut self) {
        if self.waiter.complete().is_overrun() {
            self.overruns += 1;
        }
    }

    fn abort(&mut self) -> SessionSummary {
        tracing::info!(trials = self.state.cursor, "escape pressed, ending session");
        self.state.user_abort = true;
        self.summary()
    }

    fn summary(&self) -> SessionSummary {
        let end = if self.state.user_abort {
            EndReason::Aborted
        } else {
            EndReason::Completed
        };
        SessionSummary {
            end,
            trials_run: self.state.cursor,
            correct: self.correct,
            rest_breaks: self.rest_breaks,
            overruns: self.overruns,
        }
    }
}

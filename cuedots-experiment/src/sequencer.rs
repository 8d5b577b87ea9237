use std::time::Duration;

use cuedots_core::{Key, KeyPress, Phase, Scene, TrialRecord, TrialSpec};
use cuedots_timing::{Clock, FrameIntervals, StaticPeriod};

use crate::config::ExperimentConfig;
use crate::devices::{InputPoller, Marker, MarkerSink, RecordSink, Renderer};
use crate::error::EngineError;
use crate::rig::Rig;

pub const FLIP_CATEGORY: &str = "flip";

/// What the session needs to know about a trial once its record is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub block: u32,
    pub trial: u32,
    pub frames_shown: usize,
    pub response: Option<KeyPress>,
    pub correct: Option<bool>,
    /// Waits that were already past their deadline when completed.
    pub overruns: usize,
}

impl TrialOutcome {
    pub fn escaped(&self) -> bool {
        self.response.is_some_and(|press| press.key == Key::Escape)
    }
}

struct StimulusResult {
    frames_shown: usize,
    last_flip: f64,
    response: Option<KeyPress>,
}

/// Runs one trial: fixation, cue, stimulus, feedback, then hands the record
/// to the sink.
///
/// The waiter is shared with the session so a period started between trials
/// (inter-trial interval, post-rest pause) is completed by the next trial's
/// first flip.
pub struct TrialSequencer<'a, C: Clock> {
    config: &'a ExperimentConfig,
    waiter: &'a mut StaticPeriod<C>,
    intervals: &'a mut FrameIntervals,
    phase: Phase,
    overruns: usize,
}

impl<'a, C: Clock> TrialSequencer<'a, C> {
    pub fn new(
        config: &'a ExperimentConfig,
        waiter: &'a mut StaticPeriod<C>,
        intervals: &'a mut FrameIntervals,
    ) -> Self {
        Self {
            config,
            waiter,
            intervals,
            phase: Phase::Fixation,
            overruns: 0,
        }
    }

    pub fn run<R, I, M, S>(
        mut self,
        rig: &mut Rig<R, I, M, S>,
        spec: &TrialSpec,
    ) -> Result<TrialOutcome, EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
    {
        let span = tracing::info_span!("trial", block = spec.block, trial = spec.trial);
        let _enter = span.enter();
        let mut record = TrialRecord::new();

        // Fixation
        self.settle();
        let t = flip(rig, &Scene::Fixation)?;
        record.stamp(self.phase, t)?;
        self.waiter.start(self.config.fixation());

        // Cue
        self.advance();
        self.settle();
        let t = flip(rig, &Scene::Cue { shape: spec.shape })?;
        record.stamp(self.phase, t)?;
        self.waiter.start(self.config.cue());

        // Stimulus. Anything pressed before the dots appear is discarded.
        self.advance();
        self.settle();
        rig.input.clear_events().map_err(EngineError::Input)?;
        let stimulus = self.present_stimulus(rig, spec, &mut record)?;
        record.end_stimulus(stimulus.last_flip)?;
        if let Some(press) = stimulus.response {
            record.record_response(press)?;
        }
        record.score(spec, self.config.neutral_hue)?;

        // Feedback
        self.advance();
        let correct = record.correct;
        let t = flip(rig, &Scene::Feedback {
            correct: record.is_correct(),
        })?;
        record.stamp(self.phase, t)?;
        self.waiter.start(self.config.feedback());

        tracing::info!(
            frames = stimulus.frames_shown,
            key = stimulus.response.map(|p| p.key.as_str()),
            rt_s = record
                .response_time
                .zip(record.dots_start)
                .map(|(response, onset)| response - onset),
            correct,
            "trial finished"
        );

        // The sink may block; whatever it takes comes out of the feedback
        // period, and anything beyond that lands in the next trial's timing.
        rig.sink
            .append(record.seal(spec.clone()))
            .map_err(EngineError::Sink)?;
        self.settle();

        Ok(TrialOutcome {
            block: spec.block,
            trial: spec.trial,
            frames_shown: stimulus.frames_shown,
            response: stimulus.response,
            correct,
            overruns: self.overruns,
        })
    }

    fn settle(&mut self) {
        if self.waiter.complete().is_overrun() {
            self.overruns += 1;
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            tracing::trace!(from = %self.phase, to = %next, "phase");
            self.phase = next;
        }
    }

    fn present_stimulus<R, I, M, S>(
        &mut self,
        rig: &mut Rig<R, I, M, S>,
        spec: &TrialSpec,
        record: &mut TrialRecord,
    ) -> Result<StimulusResult, EngineError>
    where
        R: Renderer,
        I: InputPoller,
        M: MarkerSink,
        S: RecordSink,
    {
        let frames = self.config.stimulus_frames();
        let mut result = StimulusResult {
            frames_shown: 0,
            last_flip: 0.0,
            response: None,
        };
        self.intervals.clear();

        for frame in 0..frames {
            let t = flip(
                rig,
                &Scene::Stimulus {
                    direction: spec.direction,
                    rgb: spec.rgb,
                    frame,
                },
            )?;
            rig.markers
                .send(&Marker {
                    category: FLIP_CATEGORY,
                    trial: spec.trial,
                    frame,
                    time: t,
                })
                .map_err(EngineError::Markers)?;
            if frame == 0 {
                record.stamp(self.phase, t)?;
            }
            if let Ok(at) = Duration::try_from_secs_f64(t) {
                self.intervals.flip(at);
            }
            result.frames_shown = frame + 1;
            result.last_flip = t;

            let presses = rig
                .input
                .get_presses(&Key::RESPONSES)
                .map_err(EngineError::Input)?;
            if let Some(first) = presses.into_iter().next() {
                result.response = Some(first);
                break;
            }
        }

        let dropped = self.intervals.dropped(self.config.frame_period());
        if dropped > 0 {
            tracing::warn!(dropped, shown = result.frames_shown, "stimulus frames missed a refresh");
        }
        if let Some(stats) = self.intervals.stats() {
            tracing::debug!(
                mean_ms = stats.mean.as_secs_f64() * 1e3,
                jitter_ms = stats.jitter.as_secs_f64() * 1e3,
                hz = stats.effective_hz,
                "stimulus frame timing"
            );
        }
        Ok(result)
    }
}

pub(crate) fn flip<R, I, M, S>(rig: &mut Rig<R, I, M, S>, scene: &Scene<'_>) -> Result<f64, EngineError>
where
    R: Renderer,
    I: InputPoller,
    M: MarkerSink,
    S: RecordSink,
{
    let t = rig.renderer.flip(scene).map_err(EngineError::Render)?;
    tracing::trace!(at = t, ?scene, "flip");
    Ok(t)
}

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cuedots_core::{CompletedTrial, Key, KeyPress, Scene, Shape, TrialSpec};
use cuedots_experiment::{
    DeviceError, ExperimentConfig, InputPoller, Marker, MarkerSink, RecordSink, Renderer, Rig,
    Tracker,
};
use cuedots_timing::Clock;

/// 60 Hz refresh in nanoseconds.
pub const PERIOD_NS: u64 = 16_666_667;

/// A flip must be submitted this long before a refresh to be shown at it.
pub const LATCH_NS: u64 = 1_000_000;

#[derive(Clone, Default)]
pub struct SimClock(Arc<AtomicU64>);

impl SimClock {
    pub fn starting_at(ns: u64) -> Self {
        Self(Arc::new(AtomicU64::new(ns)))
    }

    pub fn nanos(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_nanos(&self, ns: u64) {
        self.0.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, d: Duration) {
        self.0.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos())
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// When the cue of the `trial`-th trial run (0-based) is flipped.
    Cue { trial: usize },
    /// When stimulus frame `frame` of the `trial`-th trial run is flipped.
    StimulusFrame { trial: usize, frame: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ScriptedPress {
    pub trigger: Trigger,
    pub key: Key,
    /// How long before the triggering flip the key went down.
    pub lead_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flip {
    pub label: String,
    pub time: f64,
}

#[derive(Default)]
pub struct World {
    pub clock: SimClock,
    /// Extra time every flip costs before it waits for the refresh.
    pub render_cost: Duration,
    /// Extra time every record append blocks for.
    pub sink_cost: Duration,
    pub flips: Vec<Flip>,
    pub cues_seen: usize,
    pub script: Vec<ScriptedPress>,
    pub queue: VecDeque<KeyPress>,
    /// Answers to blocking screens, in order; the first allowed key when empty.
    pub screen_answers: VecDeque<Key>,
    pub screens_shown: usize,
    pub markers: Vec<(u32, usize, f64)>,
    pub records: Vec<CompletedTrial>,
    pub fail_append_at: Option<usize>,
    pub input_dead: bool,
    pub renderer_closed: usize,
    pub input_disconnected: usize,
    pub markers_closed: usize,
    pub sink_closed: usize,
    pub tracker_stopped: usize,
}

pub type Shared = Rc<RefCell<World>>;

pub fn world() -> Shared {
    world_at(0)
}

pub fn world_at(origin_ns: u64) -> Shared {
    Rc::new(RefCell::new(World {
        clock: SimClock::starting_at(origin_ns),
        ..Default::default()
    }))
}

fn label(scene: &Scene<'_>) -> String {
    match scene {
        Scene::Blank => "blank".into(),
        Scene::Fixation => "fixation".into(),
        Scene::Cue { shape } => format!("cue:{shape}"),
        Scene::Stimulus { frame, .. } => format!("stimulus:{frame}"),
        Scene::Feedback { correct } => format!("feedback:{correct}"),
        Scene::Text { body } => format!("text:{body}"),
    }
}

pub struct SimDisplay(pub Shared);

impl Renderer for SimDisplay {
    fn flip(&mut self, scene: &Scene<'_>) -> Result<f64, DeviceError> {
        let mut w = self.0.borrow_mut();
        let cost = w.render_cost;
        w.clock.advance(cost);
        let tick = (w.clock.nanos() + LATCH_NS).div_ceil(PERIOD_NS) * PERIOD_NS;
        w.clock.set_nanos(tick);
        let time = Duration::from_nanos(tick).as_secs_f64();

        if matches!(scene, Scene::Cue { .. }) {
            w.cues_seen += 1;
        }
        let trial = w.cues_seen.saturating_sub(1);
        let due: Vec<ScriptedPress> = w
            .script
            .iter()
            .copied()
            .filter(|p| match (p.trigger, scene) {
                (Trigger::Cue { trial: t }, Scene::Cue { .. }) => t == trial,
                (Trigger::StimulusFrame { trial: t, frame: f }, Scene::Stimulus { frame, .. }) => {
                    t == trial && f == *frame
                }
                _ => false,
            })
            .collect();
        for press in due {
            w.queue.push_back(KeyPress {
                key: press.key,
                time: time - press.lead_s,
            });
        }

        w.flips.push(Flip {
            label: label(scene),
            time,
        });
        Ok(time)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.0.borrow_mut().renderer_closed += 1;
        Ok(())
    }
}

pub struct SimInput(pub Shared);

impl InputPoller for SimInput {
    fn clear_events(&mut self) -> Result<(), DeviceError> {
        let mut w = self.0.borrow_mut();
        if w.input_dead {
            return Err(DeviceError::Disconnected);
        }
        w.queue.clear();
        Ok(())
    }

    fn get_presses(&mut self, keys: &[Key]) -> Result<Vec<KeyPress>, DeviceError> {
        let mut w = self.0.borrow_mut();
        if w.input_dead {
            return Err(DeviceError::Disconnected);
        }
        Ok(w.queue.drain(..).filter(|p| keys.contains(&p.key)).collect())
    }

    fn wait_for_press(&mut self, keys: &[Key]) -> Result<KeyPress, DeviceError> {
        let mut w = self.0.borrow_mut();
        if w.input_dead {
            return Err(DeviceError::Disconnected);
        }
        w.screens_shown += 1;
        w.clock.advance(Duration::from_secs(2));
        let key = loop {
            match w.screen_answers.pop_front() {
                Some(key) if keys.contains(&key) => break key,
                Some(_) => continue,
                None => break keys[0],
            }
        };
        let time = w.clock.now().as_secs_f64();
        Ok(KeyPress { key, time })
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.0.borrow_mut().input_disconnected += 1;
        Ok(())
    }
}

pub struct SimMarkers(pub Shared);

impl MarkerSink for SimMarkers {
    fn send(&mut self, marker: &Marker<'_>) -> Result<(), DeviceError> {
        self.0
            .borrow_mut()
            .markers
            .push((marker.trial, marker.frame, marker.time));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.0.borrow_mut().markers_closed += 1;
        Ok(())
    }
}

pub struct SimSink(pub Shared);

impl RecordSink for SimSink {
    fn append(&mut self, trial: CompletedTrial) -> Result<(), DeviceError> {
        let mut w = self.0.borrow_mut();
        if w.fail_append_at == Some(w.records.len()) {
            return Err(DeviceError::Io(std::io::Error::other("disk full")));
        }
        let cost = w.sink_cost;
        w.clock.advance(cost);
        w.records.push(trial);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.0.borrow_mut().sink_closed += 1;
        Ok(())
    }
}

pub struct SimTracker(pub Shared);

impl Tracker for SimTracker {
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.0.borrow_mut().tracker_stopped += 1;
        Ok(())
    }
}

pub type SimRig = Rig<SimDisplay, SimInput, SimMarkers, SimSink>;

pub fn rig(world: &Shared) -> SimRig {
    Rig::acquire(
        SimDisplay(world.clone()),
        SimInput(world.clone()),
        SimMarkers(world.clone()),
        SimSink(world.clone()),
    )
    .with_tracker(Box::new(SimTracker(world.clone())))
}

pub fn config() -> ExperimentConfig {
    ExperimentConfig {
        fixation_s: 0.5,
        cue_s: 1.0,
        stimulus_s: 3.0,
        feedback_s: 0.5,
        inter_trial_s: 0.5,
        refresh_hz: 60.0,
        ..Default::default()
    }
}

pub fn spec(block: u32, trial: u32, shape: Shape, hue: f64, direction: f64) -> TrialSpec {
    TrialSpec {
        subject: 1,
        block,
        trial,
        direction,
        hue,
        chroma: 15.0,
        lightness: 90.0,
        shape,
        rgb: [220, 210, 200],
    }
}

pub fn press_at_frame(trial: usize, frame: usize, key: Key) -> ScriptedPress {
    ScriptedPress {
        trigger: Trigger::StimulusFrame { trial, frame },
        key,
        lead_s: 0.004,
    }
}

pub fn labels(world: &Shared) -> Vec<String> {
    world.borrow().flips.iter().map(|f| f.label.clone()).collect()
}

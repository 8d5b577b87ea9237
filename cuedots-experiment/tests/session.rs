mod common;

use common::*;
use cuedots_core::{Key, Shape, TrialSpec};
use cuedots_experiment::design::in_memory;
use cuedots_experiment::{
    DesignError, EndReason, EngineError, ExperimentConfig, SessionController, SessionSummary,
    TaskMode,
};

fn design(blocks: &[u32]) -> Vec<TrialSpec> {
    blocks
        .iter()
        .enumerate()
        .map(|(i, &block)| {
            let shape = Shape::ALL[i % Shape::ALL.len()];
            spec(block, i as u32, shape, 30.0 * i as f64, 30.0 - 15.0 * i as f64)
        })
        .collect()
}

fn run(
    world: &Shared,
    config: ExperimentConfig,
    mode: TaskMode,
    specs: Vec<TrialSpec>,
) -> Result<SessionSummary, EngineError> {
    let clock = world.borrow().clock.clone();
    let mut rig = rig(world);
    let result = SessionController::new(config, mode, clock).run(&mut rig, in_memory(specs));
    assert!(rig.is_released());
    result
}

fn assert_torn_down_once(world: &Shared) {
    let w = world.borrow();
    assert_eq!(w.tracker_stopped, 1);
    assert_eq!(w.input_disconnected, 1);
    assert_eq!(w.markers_closed, 1);
    assert_eq!(w.sink_closed, 1);
    assert_eq!(w.renderer_closed, 1);
}

fn recorded_trials(world: &Shared) -> Vec<u32> {
    world
        .borrow()
        .records
        .iter()
        .map(|r| r.spec().trial)
        .collect()
}

fn rest_screens(world: &Shared, config: &ExperimentConfig) -> Vec<usize> {
    let rest = format!("text:{}", config.rest_text);
    labels(world)
        .iter()
        .enumerate()
        .filter(|(_, l)| **l == rest)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn full_session_records_every_trial_in_order() {
    let world = world();
    let summary = run(&world, config(), TaskMode::Main, design(&[0, 0, 1, 1, 2])).unwrap();

    assert_eq!(summary.end, EndReason::Completed);
    assert_eq!(summary.trials_run, 5);
    assert_eq!(recorded_trials(&world), vec![0, 1, 2, 3, 4]);
    assert_torn_down_once(&world);
}

#[test]
fn rest_screen_appears_only_at_block_changes() {
    let world = world();
    let config = config();
    let blocks = [0, 0, 1, 1, 1, 2, 0];
    let summary = run(&world, config.clone(), TaskMode::Main, design(&blocks)).unwrap();

    let expected = blocks.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(summary.rest_breaks, expected);
    assert_eq!(rest_screens(&world, &config).len(), expected);

    // Each rest screen sits between a feedback flip and the next fixation.
    let labels = labels(&world);
    for i in rest_screens(&world, &config) {
        assert!(labels[i - 1].starts_with("feedback:"));
        assert_eq!(labels[i + 1], "blank");
        assert_eq!(labels[i + 2], "fixation");
    }
}

#[test]
fn consecutive_trials_are_separated_by_a_blank_interval() {
    let world = world();
    let config = config();
    run(&world, config.clone(), TaskMode::Test, design(&[0, 0])).unwrap();

    let w = world.borrow();
    let first = w.records[0].record();
    let second = w.records[1].record();
    let gap = second.fix_start.unwrap() - first.feedback_start.unwrap();
    let expected = config.feedback_s + config.inter_trial_s;
    assert!((gap - expected).abs() < 1.0 / 60.0, "gap was {gap}");
    assert!(labels(&world).contains(&"blank".to_string()));
}

fn feedback_to_next_fixation(world: &Shared) -> f64 {
    let w = world.borrow();
    w.records[1].record().fix_start.unwrap() - w.records[0].record().feedback_start.unwrap()
}

#[test]
fn slow_sink_delays_the_next_trial_by_the_excess() {
    let config = config();
    let frame = 1.0 / config.refresh_hz;

    let on_time = world();
    let summary = run(&on_time, config.clone(), TaskMode::Test, design(&[0, 0])).unwrap();
    assert_eq!(summary.overruns, 0);

    let sink_cost = std::time::Duration::from_millis(800);
    let slow = world();
    slow.borrow_mut().sink_cost = sink_cost;
    let summary = run(&slow, config.clone(), TaskMode::Test, design(&[0, 0])).unwrap();
    assert_eq!(summary.end, EndReason::Completed);
    assert_eq!(summary.trials_run, 2);
    assert_eq!(summary.overruns, 2);

    let excess = sink_cost.as_secs_f64() - config.feedback_s;
    let delay = feedback_to_next_fixation(&slow) - feedback_to_next_fixation(&on_time);
    assert!(delay >= excess, "delay was {delay}");
    assert!(delay < excess + 2.0 * frame, "delay was {delay}");
}

#[test]
fn escape_at_rest_stops_before_the_next_trial() {
    let world = world();
    world
        .borrow_mut()
        .screen_answers
        .extend([Key::Space, Key::Escape]);
    let summary = run(&world, config(), TaskMode::Main, design(&[0, 0, 1, 1])).unwrap();

    assert_eq!(summary.end, EndReason::Aborted);
    assert_eq!(recorded_trials(&world), vec![0, 1]);
    let fixations = labels(&world).iter().filter(|l| *l == "fixation").count();
    assert_eq!(fixations, 2);
    assert_torn_down_once(&world);
}

#[test]
fn escape_during_stimulus_ends_after_that_trial() {
    let world = world();
    world
        .borrow_mut()
        .script
        .push(press_at_frame(1, 12, Key::Escape));
    let summary = run(&world, config(), TaskMode::Main, design(&[0, 0, 0, 0])).unwrap();

    assert_eq!(summary.end, EndReason::Aborted);
    assert_eq!(summary.trials_run, 2);
    assert_eq!(recorded_trials(&world), vec![0, 1]);
    assert_eq!(
        world.borrow().records[1].record().response_key,
        Some(Key::Escape)
    );
    assert_torn_down_once(&world);
}

#[test]
fn escape_at_instructions_runs_nothing() {
    let world = world();
    world.borrow_mut().screen_answers.push_back(Key::Escape);
    let summary = run(&world, config(), TaskMode::Main, design(&[0, 0])).unwrap();

    assert_eq!(summary.end, EndReason::Aborted);
    assert_eq!(summary.trials_run, 0);
    assert!(world.borrow().records.is_empty());
    assert_torn_down_once(&world);
}

#[test]
fn sink_failure_aborts_and_still_tears_down() {
    let world = world();
    world.borrow_mut().fail_append_at = Some(1);
    let err = run(&world, config(), TaskMode::Main, design(&[0, 0, 0])).unwrap_err();

    assert!(matches!(err, EngineError::Sink(_)));
    assert_eq!(recorded_trials(&world), vec![0]);
    assert_torn_down_once(&world);
}

#[test]
fn malformed_design_row_is_fatal() {
    let world = world();
    let clock = world.borrow().clock.clone();
    let mut rig = rig(&world);
    let rows = design(&[0, 0])
        .into_iter()
        .map(Ok)
        .chain(std::iter::once(Err(DesignError::MissingColumn("hue"))));

    let err = SessionController::new(config(), TaskMode::Test, clock)
        .run(&mut rig, rows)
        .unwrap_err();

    assert!(matches!(err, EngineError::Design(_)));
    assert_eq!(recorded_trials(&world), vec![0, 1]);
    drop(rig);
    assert_torn_down_once(&world);
}

#[test]
fn empty_design_completes_normally() {
    let world = world();
    let summary = run(&world, config(), TaskMode::Test, Vec::new()).unwrap();
    assert_eq!(summary.end, EndReason::Completed);
    assert_eq!(summary.trials_run, 0);
    assert_torn_down_once(&world);
}

#[test]
fn test_mode_runs_a_few_trials_without_instructions() {
    let world = world();
    let config = ExperimentConfig {
        test_trials: 2,
        ..config()
    };
    let summary = run(&world, config, TaskMode::Test, design(&[0, 0, 0, 0, 0])).unwrap();

    assert_eq!(summary.trials_run, 2);
    assert_eq!(world.borrow().screens_shown, 0);
    // No trailing inter-trial interval after the last trial in scope.
    assert!(labels(&world).last().unwrap().starts_with("feedback:"));
}

#[test]
fn instruct_mode_runs_the_first_block_only() {
    let world = world();
    let summary = run(&world, config(), TaskMode::Instruct, design(&[4, 4, 5, 5])).unwrap();

    assert_eq!(summary.end, EndReason::Completed);
    assert_eq!(recorded_trials(&world), vec![0, 1]);
    assert_eq!(summary.rest_breaks, 0);
    assert_eq!(world.borrow().screens_shown, 1);
}

#[test]
fn correct_answers_are_counted() {
    let world = world();
    {
        let mut w = world.borrow_mut();
        // Trial 0: triangle, hue 0 -> left is correct.
        w.script.push(press_at_frame(0, 5, Key::Left));
        // Trial 1: circle, hue 30 -> right is wrong.
        w.script.push(press_at_frame(1, 5, Key::Right));
    }
    let summary = run(&world, config(), TaskMode::Test, design(&[0, 0, 0])).unwrap();
    assert_eq!(summary.correct, 1);
}

#[test]
fn replay_is_identical_up_to_a_clock_offset() {
    let offset_ns = 9_000 * PERIOD_NS;
    let offset = std::time::Duration::from_nanos(offset_ns).as_secs_f64();

    let mut runs = Vec::new();
    for origin in [0, offset_ns] {
        let world = world_at(origin);
        {
            let mut w = world.borrow_mut();
            w.script.push(press_at_frame(0, 30, Key::Left));
            w.script.push(press_at_frame(2, 7, Key::Right));
        }
        run(&world, config(), TaskMode::Main, design(&[0, 0, 1])).unwrap();
        let records: Vec<_> = world
            .borrow()
            .records
            .iter()
            .map(|r| r.record().clone())
            .collect();
        runs.push(records);
    }

    let shift = |v: Option<f64>| v.map(|t| t - offset);
    let close = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-6,
        (None, None) => true,
        _ => false,
    };
    assert_eq!(runs[0].len(), runs[1].len());
    for (a, b) in runs[0].iter().zip(&runs[1]) {
        assert!(close(a.fix_start, shift(b.fix_start)));
        assert!(close(a.cue_start, shift(b.cue_start)));
        assert!(close(a.dots_start, shift(b.dots_start)));
        assert!(close(a.dots_end, shift(b.dots_end)));
        assert!(close(a.response_time, shift(b.response_time)));
        assert!(close(a.feedback_start, shift(b.feedback_start)));
        assert_eq!(a.response_key, b.response_key);
        assert_eq!(a.correct, b.correct);
    }
}

mod common;

use common::*;
use cuedots_core::{Key, Shape};
use cuedots_experiment::TrialSequencer;
use cuedots_timing::{FrameIntervals, StaticPeriod};
use proptest::prelude::*;

const FRAMES: usize = 180;

fn key() -> impl Strategy<Value = Key> {
    prop_oneof![Just(Key::Left), Just(Key::Right), Just(Key::Escape)]
}

fn shape() -> impl Strategy<Value = Shape> {
    prop::sample::select(Shape::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stamps_stay_ordered_wherever_the_press_lands(
        press in prop::option::of((0..FRAMES + 20, key())),
        shape in shape(),
        hue in 0.0f64..360.0,
        direction in -180.0f64..180.0,
        render_ms in 0u64..8,
        origin_frames in 0u64..10_000,
    ) {
        let world = world_at(origin_frames * PERIOD_NS);
        world.borrow_mut().render_cost = std::time::Duration::from_millis(render_ms);
        if let Some((frame, key)) = press {
            world.borrow_mut().script.push(press_at_frame(0, frame, key));
        }

        let config = config();
        let clock = world.borrow().clock.clone();
        let mut waiter = StaticPeriod::for_refresh_rate(clock, config.refresh_hz);
        let mut intervals = FrameIntervals::default();
        let mut rig = rig(&world);
        let outcome = TrialSequencer::new(&config, &mut waiter, &mut intervals)
            .run(&mut rig, &spec(0, 0, shape, hue, direction))
            .unwrap();

        let answered = press.filter(|(frame, _)| *frame < FRAMES);
        let expected_frames = answered.map_or(FRAMES, |(frame, _)| frame + 1);
        prop_assert_eq!(outcome.frames_shown, expected_frames);
        prop_assert_eq!(world.borrow().markers.len(), expected_frames);

        let w = world.borrow();
        let r = w.records[0].record();
        let stamps = [
            r.fix_start.unwrap(),
            r.cue_start.unwrap(),
            r.dots_start.unwrap(),
            r.dots_end.unwrap(),
            r.feedback_start.unwrap(),
        ];
        prop_assert!(stamps.windows(2).all(|p| p[0] <= p[1]));

        match answered {
            Some((_, key)) => {
                prop_assert_eq!(r.response_key, Some(key));
                prop_assert!(r.response_time.unwrap() <= r.dots_end.unwrap());
                prop_assert!(r.correct.is_some());
                if key == Key::Escape {
                    prop_assert_eq!(r.correct, Some(false));
                }
            }
            None => {
                prop_assert_eq!(r.response_key, None);
                prop_assert_eq!(r.correct, None);
            }
        }
    }
}

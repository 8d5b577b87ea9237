use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic session clock.
///
/// `now()` is measured from an origin shared by every clone, so timestamps
/// taken by the display, the input device and the waiter are comparable.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);

    fn seconds(&self) -> f64 {
        self.now().as_secs_f64()
    }
}

/// Below this, sleeping is handed to a spin loop on platforms without an
/// absolute monotonic sleep.
#[cfg_attr(target_os = "linux", allow(dead_code))]
const SPIN_THRESHOLD: Duration = Duration::from_micros(1_500);

#[derive(Debug, Clone, Copy)]
pub struct HighPrecisionTimer {
    start: Instant,
}

impl Clock for HighPrecisionTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn origin(&self) -> Instant {
        self.start
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        self.spin_sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // Relative sleep; restart with the remainder when a signal cuts it short.
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                break;
            }
            req = rem;
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn spin_sleep(&self, duration: Duration) {
        let target = Instant::now() + duration;
        if duration > SPIN_THRESHOLD {
            std::thread::sleep(duration - SPIN_THRESHOLD);
        }
        while Instant::now() < target {
            std::hint::spin_loop();
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub count: usize,
    pub mean: Duration,
    pub jitter: Duration,
    pub min: Duration,
    pub max: Duration,
    pub effective_hz: f64,
}

/// Rolling window of flip-to-flip intervals.
#[derive(Debug, Clone)]
pub struct FrameIntervals {
    intervals: VecDeque<Duration>,
    max_samples: usize,
    last_flip: Option<Duration>,
}

impl FrameIntervals {
    pub fn new(max_samples: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            last_flip: None,
        }
    }

    /// Feeds a flip timestamp; the interval to the previous flip is recorded.
    pub fn flip(&mut self, at: Duration) {
        if let Some(prev) = self.last_flip.replace(at) {
            self.record(at.saturating_sub(prev));
        }
    }

    pub fn record(&mut self, interval: Duration) {
        if self.intervals.len() >= self.max_samples {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    /// Forgets the previous flip so the next one starts a fresh interval.
    pub fn break_chain(&mut self) {
        self.last_flip = None;
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
        self.last_flip = None;
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Intervals longer than one and a half expected periods, i.e. flips that
    /// missed at least one refresh.
    pub fn dropped(&self, expected: Duration) -> usize {
        let limit = expected.mul_f64(1.5);
        self.intervals.iter().filter(|d| **d > limit).count()
    }

    pub fn stats(&self) -> Option<FrameStats> {
        if self.intervals.is_empty() {
            return None;
        }
        let secs: Vec<f64> = self.intervals.iter().map(Duration::as_secs_f64).collect();
        let n = secs.len() as f64;
        let mean = secs.iter().sum::<f64>() / n;
        let var = secs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = self.intervals.iter().min().copied().unwrap_or_default();
        let max = self.intervals.iter().max().copied().unwrap_or_default();

        Some(FrameStats {
            count: secs.len(),
            mean: Duration::from_secs_f64(mean),
            jitter: Duration::from_secs_f64(var.sqrt()),
            min,
            max,
            effective_hz: if mean > 0.0 { 1.0 / mean } else { 0.0 },
        })
    }
}

impl Default for FrameIntervals {
    fn default() -> Self {
        Self::new(1000)
    }
}

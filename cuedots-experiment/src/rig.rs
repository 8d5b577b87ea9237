use crate::devices::{DeviceError, InputPoller, MarkerSink, RecordSink, Renderer, Tracker};

/// Every device a session talks to, acquired together and released together.
///
/// [`Rig::release`] shuts the devices down in a fixed order (tracker, input,
/// marker stream, record sink, display) and only ever does so once; dropping
/// an unreleased rig releases it.
pub struct Rig<R, I, M, S>
where
    R: Renderer,
    I: InputPoller,
    M: MarkerSink,
    S: RecordSink,
{
    pub renderer: R,
    pub input: I,
    pub markers: M,
    pub sink: S,
    tracker: Option<Box<dyn Tracker>>,
    released: bool,
}

/// Devices that failed to shut down cleanly.
#[derive(Debug, Default)]
pub struct Teardown {
    pub failures: Vec<(&'static str, DeviceError)>,
}

impl Teardown {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn describe(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(device, err)| format!("{device}: {err}"))
            .collect()
    }

    fn check(&mut self, device: &'static str, result: Result<(), DeviceError>) {
        if let Err(err) = result {
            tracing::error!(device, error = %err, "teardown step failed");
            self.failures.push((device, err));
        }
    }
}

impl<R, I, M, S> Rig<R, I, M, S>
where
    R: Renderer,
    I: InputPoller,
    M: MarkerSink,
    S: RecordSink,
{
    pub fn acquire(renderer: R, input: I, markers: M, sink: S) -> Self {
        Self {
            renderer,
            input,
            markers,
            sink,
            tracker: None,
            released: false,
        }
    }

    pub fn with_tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Shuts every device down. A second call is a no-op returning a clean
    /// report.
    pub fn release(&mut self) -> Teardown {
        let mut report = Teardown::default();
        if std::mem::replace(&mut self.released, true) {
            return report;
        }

        if let Some(mut tracker) = self.tracker.take() {
            report.check("tracker", tracker.stop());
        }
        report.check("input", self.input.disconnect());
        report.check("markers", self.markers.close());
        report.check("sink", self.sink.close());
        report.check("renderer", self.renderer.close());

        tracing::info!(clean = report.is_clean(), "devices released");
        report
    }
}

impl<R, I, M, S> Drop for Rig<R, I, M, S>
where
    R: Renderer,
    I: InputPoller,
    M: MarkerSink,
    S: RecordSink,
{
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("rig dropped without release, tearing down");
            self.release();
        }
    }
}

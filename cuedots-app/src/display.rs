use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cuedots_core::{Key, KeyPress, Scene};
use cuedots_experiment::{DeviceError, InputPoller, Renderer};
use cuedots_render::{RenderConfig, SkiaRenderer};
use cuedots_timing::{Clock, HighPrecisionTimer};
use pixels::{Pixels, PixelsBuilder, SurfaceTexture};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, Window, WindowId},
};

/// How long `wait_for_press` lets the event loop block per iteration.
const WAIT_SLICE: Duration = Duration::from_millis(5);

fn key_for(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::Space => Some(Key::Space),
        _ => None,
    }
}

/// Window, surface and keyboard queue. Driven by pumping the event loop
/// from the session thread instead of handing control to winit.
struct HostState {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    render_config: RenderConfig,
    feedback_text: (String, String),
    clock: HighPrecisionTimer,
    queue: VecDeque<KeyPress>,
    refresh_hz: Option<f64>,
    closed: bool,
    input_closed: bool,
    failure: Option<String>,
}

impl HostState {
    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("no monitor available"))?;
        self.refresh_hz = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let attributes = Window::default_attributes()
            .with_title("cuedots")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        tracing::info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = self.refresh_hz,
            "display opened"
        );

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(
            PixelsBuilder::new(size.width, size.height, surface)
                .enable_vsync(true)
                .build()?,
        );
        let (correct, incorrect) = &self.feedback_text;
        self.renderer = Some(
            SkiaRenderer::new(size.width, size.height, self.render_config.clone())?
                .with_feedback_text(correct, incorrect),
        );

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if self
            .renderer
            .as_ref()
            .is_some_and(|r| r.size() == (size.width, size.height))
        {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                tracing::warn!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                tracing::warn!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size.width, size.height) {
                self.failure = Some(e.to_string());
            }
        }
        tracing::info!(width = size.width, height = size.height, "display resized");
    }

    fn present(&mut self, scene: &Scene<'_>) -> Result<(), DeviceError> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Err(DeviceError::DisplayClosed);
        };
        let stats = renderer
            .render_scene(scene, pixels.frame_mut())
            .map_err(|e| DeviceError::backend("renderer", e))?;
        pixels
            .render()
            .map_err(|e| DeviceError::backend("display", e))?;
        tracing::trace!(
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            dirty = stats.dirty_count,
            "frame presented"
        );
        Ok(())
    }

    fn shut_down(&mut self) {
        if let Some(renderer) = &self.renderer {
            tracing::info!(
                stimuli = renderer.stimuli_started(),
                texts = renderer.cached_texts(),
                "renderer released"
            );
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.pixels = None;
        self.renderer = None;
        self.window = None;
        self.closed = true;
    }
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.closed {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                tracing::error!(error = %e, "failed to create window and surface");
                self.failure = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                tracing::warn!("window closed by the system");
                self.shut_down();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = key_for(code) {
                        let time = self.clock.seconds();
                        tracing::trace!(key = key.as_str(), time, "key down");
                        self.queue.push_back(KeyPress { key, time });
                    }
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::RedrawRequested => {
                // Re-show whatever the last flip drew, e.g. after an expose.
                if let Some(pixels) = &self.pixels {
                    if let Err(e) = pixels.render() {
                        tracing::warn!(error = %e, "redraw failed");
                    }
                }
            }
            _ => {}
        }
    }
}

struct WindowHost {
    event_loop: EventLoop<()>,
    state: HostState,
}

impl WindowHost {
    fn pump(&mut self, timeout: Option<Duration>) -> Result<(), DeviceError> {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            tracing::debug!(code, "event loop exited");
            self.state.closed = true;
        }
        if let Some(message) = self.state.failure.take() {
            return Err(DeviceError::backend("display", message));
        }
        if self.state.closed {
            return Err(DeviceError::DisplayClosed);
        }
        Ok(())
    }

    fn check_input(&self) -> Result<(), DeviceError> {
        if self.state.input_closed {
            Err(DeviceError::Disconnected)
        } else {
            Ok(())
        }
    }
}

type SharedHost = Rc<RefCell<WindowHost>>;

/// Fullscreen window presenting scenes with vsync.
pub struct WinitDisplay(SharedHost);

/// Keyboard of the same window. Presses are stamped on the session clock
/// when the event loop delivers them.
pub struct WinitKeyboard(SharedHost);

/// Opens the window and returns its display and keyboard halves.
pub fn open(
    render_config: RenderConfig,
    feedback_text: (String, String),
    clock: HighPrecisionTimer,
) -> Result<(WinitDisplay, WinitKeyboard)> {
    let event_loop = EventLoop::new()?;
    let mut host = WindowHost {
        event_loop,
        state: HostState {
            window: None,
            pixels: None,
            renderer: None,
            render_config,
            feedback_text,
            clock,
            queue: VecDeque::new(),
            refresh_hz: None,
            closed: false,
            input_closed: false,
            failure: None,
        },
    };

    // The window is created from `resumed`, which arrives on the first pumps.
    for _ in 0..200 {
        host.pump(Some(Duration::from_millis(10)))?;
        if host.state.pixels.is_some() {
            break;
        }
    }
    anyhow::ensure!(host.state.pixels.is_some(), "window did not open");

    let host = Rc::new(RefCell::new(host));
    Ok((WinitDisplay(host.clone()), WinitKeyboard(host)))
}

impl WinitDisplay {
    pub fn refresh_hz(&self) -> Option<f64> {
        self.0.borrow().state.refresh_hz
    }
}

impl Renderer for WinitDisplay {
    fn flip(&mut self, scene: &Scene<'_>) -> Result<f64, DeviceError> {
        let mut host = self.0.borrow_mut();
        host.pump(Some(Duration::ZERO))?;
        host.state.present(scene)?;
        Ok(host.state.clock.seconds())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let mut guard = self.0.borrow_mut();
        let host = &mut *guard;
        host.state.shut_down();
        // Let the platform process the window teardown.
        let _ = host.event_loop.pump_app_events(Some(Duration::ZERO), &mut host.state);
        tracing::debug!("display closed");
        Ok(())
    }
}

impl InputPoller for WinitKeyboard {
    fn clear_events(&mut self) -> Result<(), DeviceError> {
        let mut host = self.0.borrow_mut();
        host.check_input()?;
        host.pump(Some(Duration::ZERO))?;
        host.state.queue.clear();
        Ok(())
    }

    fn get_presses(&mut self, keys: &[Key]) -> Result<Vec<KeyPress>, DeviceError> {
        let mut host = self.0.borrow_mut();
        host.check_input()?;
        host.pump(Some(Duration::ZERO))?;
        Ok(host
            .state
            .queue
            .drain(..)
            .filter(|p| keys.contains(&p.key))
            .collect())
    }

    fn wait_for_press(&mut self, keys: &[Key]) -> Result<KeyPress, DeviceError> {
        let mut host = self.0.borrow_mut();
        host.check_input()?;
        loop {
            let queue = &mut host.state.queue;
            if let Some(pos) = queue.iter().position(|p| keys.contains(&p.key)) {
                if let Some(press) = queue.drain(..=pos).last() {
                    return Ok(press);
                }
            }
            host.pump(Some(WAIT_SLICE))?;
        }
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        let mut host = self.0.borrow_mut();
        host.state.queue.clear();
        host.state.input_closed = true;
        Ok(())
    }
}

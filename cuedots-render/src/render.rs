use std::time::Duration;

use bytemuck::{cast_slice, cast_slice_mut};
use cuedots_core::{Scene, Shape};
use cuedots_timing::{Clock, HighPrecisionTimer};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

use crate::config::RenderConfig;
use crate::dots::DotField;
use crate::text::{FontError, TextCache, resolve_font};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    FrameBuffer { expected: usize, actual: usize },
    #[error(transparent)]
    Font(#[from] FontError),
}

#[repr(usize)]
#[derive(Debug, Clone, Copy)]
enum CacheIndex {
    Fixation = 0,
    Triangle = 1,
    Circle = 2,
    Cross = 3,
    Fleur = 4,
}

impl CacheIndex {
    const COUNT: usize = 5;

    fn for_shape(shape: Shape) -> Self {
        match shape {
            Shape::Triangle => CacheIndex::Triangle,
            Shape::Circle => CacheIndex::Circle,
            Shape::Cross => CacheIndex::Cross,
            Shape::Fleur => CacheIndex::Fleur,
        }
    }
}

/// Where the time of one `render_scene` call went.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// CPU rasteriser for [`Scene`]s.
///
/// Draws into an offscreen premultiplied canvas and only copies the
/// rectangles touched since the previous frame into the caller's RGBA
/// buffer, so the buffer must be the same one every call.
pub struct SkiaRenderer {
    config: RenderConfig,
    width: u32,
    height: u32,
    center: (f32, f32),

    static_cache: Vec<Pixmap>,
    text: TextCache,
    correct_text: String,
    incorrect_text: String,
    dots: DotField,
    trials_drawn: u64,

    canvas: Pixmap,
    clear_buffer: Vec<u8>,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
    timer: HighPrecisionTimer,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, config: RenderConfig) -> Result<Self, RenderError> {
        let font = resolve_font(config.font_path.as_deref())?;

        let mut renderer = SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            static_cache: Vec::with_capacity(CacheIndex::COUNT),
            text: TextCache::new(font, config.font_size_px, config.foreground),
            correct_text: "Correct".to_string(),
            incorrect_text: "Incorrect".to_string(),
            dots: DotField::new(
                config.n_dots,
                config.field_radius_px(),
                config.speed_px(),
                config.dot_life,
                config.seed,
            ),
            trials_drawn: 0,
            canvas: blank_canvas(width, height, config.background)?,
            clear_buffer: clear_buffer(width, height, config.background),
            dirty_regions: Vec::with_capacity(64),
            first_frame: true,
            timer: HighPrecisionTimer::new(),
            config,
        };
        renderer.init_cache()?;
        Ok(renderer)
    }

    pub fn with_feedback_text(mut self, correct: &str, incorrect: &str) -> Self {
        self.correct_text = correct.to_string();
        self.incorrect_text = incorrect.to_string();
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.canvas = blank_canvas(width, height, self.config.background)?;
        self.clear_buffer = clear_buffer(width, height, self.config.background);
        self.width = width;
        self.height = height;
        self.center = (width as f32 / 2.0, height as f32 / 2.0);
        self.dirty_regions.clear();
        self.first_frame = true;
        Ok(())
    }

    fn init_cache(&mut self) -> Result<(), RenderError> {
        let fixation = self.render_fixation()?;
        self.static_cache.push(fixation);
        for shape in Shape::ALL {
            let pm = self.render_cue(shape)?;
            self.static_cache.push(pm);
        }
        debug_assert_eq!(self.static_cache.len(), CacheIndex::COUNT);
        Ok(())
    }

    fn paint(&self) -> Paint<'static> {
        let [r, g, b] = self.config.foreground;
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(Color::from_rgba8(r, g, b, 255));
        paint
    }

    fn render_fixation(&self) -> Result<Pixmap, RenderError> {
        let radius = self.config.px(self.config.fixation_radius).max(1.0);
        let size = (radius * 2.0).ceil() as u32 + 2;
        let mut pm = new_pixmap(size, size)?;
        let c = size as f32 * 0.5;
        if let Some(path) = PathBuilder::from_circle(c, c, radius) {
            pm.fill_path(&path, &self.paint(), FillRule::Winding, Transform::identity(), None);
        }
        Ok(pm)
    }

    fn render_cue(&self, shape: Shape) -> Result<Pixmap, RenderError> {
        let half = self.config.px(self.config.cue_size).max(4.0) * 0.5;
        let size = (half * 2.0).ceil() as u32 + 2;
        let mut pm = new_pixmap(size, size)?;
        let c = size as f32 * 0.5;
        let paint = self.paint();

        let path = match shape {
            Shape::Triangle => {
                let mut pb = PathBuilder::new();
                pb.move_to(c, c - half);
                pb.line_to(c + half * 0.866, c + half * 0.5);
                pb.line_to(c - half * 0.866, c + half * 0.5);
                pb.close();
                pb.finish()
            }
            Shape::Circle => PathBuilder::from_circle(c, c, half),
            Shape::Cross => {
                let arm = half * 0.3;
                let mut pb = PathBuilder::new();
                if let Some(r) = Rect::from_xywh(c - half, c - arm, half * 2.0, arm * 2.0) {
                    pb.push_rect(r);
                }
                if let Some(r) = Rect::from_xywh(c - arm, c - half, arm * 2.0, half * 2.0) {
                    pb.push_rect(r);
                }
                pb.finish()
            }
            Shape::Fleur => {
                // Four petals around a small core.
                let petal = half * 0.45;
                let mut pb = PathBuilder::new();
                for (dx, dy) in [(0.0, -1.0), (1.0, 0.0), (0.0, 1.0), (-1.0, 0.0)] {
                    pb.push_circle(c + dx * (half - petal), c + dy * (half - petal), petal);
                }
                pb.push_circle(c, c, petal);
                pb.finish()
            }
        };
        if let Some(path) = path {
            pm.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        Ok(pm)
    }

    /// Draws `scene` and copies the changed regions into `frame_buffer`
    /// (RGBA, `width * height * 4` bytes).
    pub fn render_scene(&mut self, scene: &Scene<'_>, frame_buffer: &mut [u8]) -> Result<DrawStats, RenderError> {
        let expected = self.clear_buffer.len();
        if frame_buffer.len() != expected {
            return Err(RenderError::FrameBuffer {
                expected,
                actual: frame_buffer.len(),
            });
        }
        let start = self.timer.now();

        if self.first_frame {
            self.first_frame = false;
            self.canvas.data_mut().copy_from_slice(&self.clear_buffer);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        let old_dirty = std::mem::take(&mut self.dirty_regions);
        self.clear_dirty(&old_dirty);
        let t_clear = self.timer.now();

        self.draw(scene);
        let t_draw = self.timer.now();

        let mut present = old_dirty;
        present.extend_from_slice(&self.dirty_regions);
        coalesce_dirty(&mut present);
        for rect in &present {
            self.copy_dirty_region(*rect, frame_buffer);
        }
        let t_copy = self.timer.now();

        Ok(DrawStats {
            clear: t_clear - start,
            draw: t_draw - t_clear,
            copy: t_copy - t_draw,
            total: t_copy - start,
            dirty_count: self.dirty_regions.len(),
        })
    }

    fn draw(&mut self, scene: &Scene<'_>) {
        match scene {
            Scene::Blank => {}
            Scene::Fixation => self.blit_cached(CacheIndex::Fixation, self.center),
            Scene::Cue { shape } => {
                self.blit_cached(CacheIndex::for_shape(*shape), self.center);
                self.blit_cached(CacheIndex::Fixation, self.center);
            }
            Scene::Stimulus { direction, rgb, frame } => {
                if *frame == 0 {
                    self.trials_drawn += 1;
                    self.dots.reset(*direction);
                } else {
                    self.dots.advance_to(*frame);
                }
                self.draw_dots(*rgb);
                self.blit_cached(CacheIndex::Fixation, self.center);
            }
            Scene::Feedback { correct } => {
                let text = if *correct {
                    self.correct_text.clone()
                } else {
                    self.incorrect_text.clone()
                };
                self.blit_text(&text, self.center);
            }
            Scene::Text { body } => self.blit_text(body, self.center),
        }
    }

    fn draw_dots(&mut self, rgb: [u8; 3]) {
        let size = self.config.dot_size_px.max(1.0);
        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255));

        let (cx, cy) = self.center;
        let rects: Vec<Rect> = self
            .dots
            .positions()
            .filter_map(|(x, y)| {
                Rect::from_xywh((cx + x - size * 0.5).floor(), (cy + y - size * 0.5).floor(), size, size)
            })
            .collect();
        for rect in rects {
            self.canvas.fill_rect(rect, &paint, Transform::identity(), None);
            self.dirty_regions.push(rect);
        }
    }

    fn blit_cached(&mut self, index: CacheIndex, pos: (f32, f32)) {
        let pm = &self.static_cache[index as usize];
        if let Some(rect) = blend_onto(&mut self.canvas, pm, pos) {
            self.dirty_regions.push(rect);
        }
    }

    fn blit_text(&mut self, text: &str, pos: (f32, f32)) {
        let Some(pm) = self.text.get_or_render(text) else {
            return;
        };
        if let Some(rect) = blend_onto(&mut self.canvas, &pm, pos) {
            self.dirty_regions.push(rect);
        }
    }

    /// Number of distinct strings rendered so far.
    pub fn cached_texts(&self) -> usize {
        self.text.len()
    }

    pub fn stimuli_started(&self) -> u64 {
        self.trials_drawn
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();
        for rect in dirty {
            let Some((x0, y0, x1, y1)) = clip(rect, self.width, self.height) else {
                continue;
            };
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len].copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = clip(&dirty, self.width, self.height) else {
            return;
        };
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();
        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            frame_buffer[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }
}

fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, RenderError> {
    Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })
}

fn blank_canvas(width: u32, height: u32, background: [u8; 3]) -> Result<Pixmap, RenderError> {
    let mut canvas = new_pixmap(width, height)?;
    canvas.fill(Color::from_rgba8(background[0], background[1], background[2], 255));
    Ok(canvas)
}

fn clear_buffer(width: u32, height: u32, background: [u8; 3]) -> Vec<u8> {
    [background[0], background[1], background[2], 255]
        .into_iter()
        .cycle()
        .take(width as usize * height as usize * 4)
        .collect()
}

fn clip(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().clamp(0.0, width as f32) as usize;
    let y0 = rect.y().floor().clamp(0.0, height as f32) as usize;
    let x1 = (rect.x() + rect.width()).ceil().clamp(0.0, width as f32) as usize;
    let y1 = (rect.y() + rect.height()).ceil().clamp(0.0, height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Merges rectangles on the same row that touch or overlap.
fn coalesce_dirty(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for r in rects.drain(..) {
        if let Some(last) = out.last_mut() {
            let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
            let touching = r.x() <= last.x() + last.width() + 1.0;
            if same_row && touching {
                let nx = last.x().min(r.x());
                let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                    *last = merged;
                    continue;
                }
            }
        }
        out.push(r);
    }
    *rects = out;
}

/// Blends `src` centred on `pos` over `canvas` and returns the touched
/// rectangle, or `None` when it falls entirely off the canvas.
fn blend_onto(canvas: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) -> Option<Rect> {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    let x = (pos.0 - w as f32 * 0.5).floor() as i32;
    let y = (pos.1 - h as f32 * 0.5).floor() as i32;
    if x + w <= 0 || y + h <= 0 || x >= cw || y >= ch {
        return None;
    }

    let dst_x = x.max(0) as usize;
    let dst_y = y.max(0) as usize;
    let src_x = (-x).max(0) as usize;
    let src_y = (-y).max(0) as usize;
    let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
    let copy_h = (h as usize - src_y).min(ch as usize - dst_y);

    let src_u32: &[u32] = cast_slice(src.data());
    let canvas_w = cw as usize;
    let dst_u32: &mut [u32] = cast_slice_mut(canvas.data_mut());

    for row in 0..copy_h {
        let s_row = (src_y + row) * w as usize + src_x;
        let d_row = (dst_y + row) * canvas_w + dst_x;
        let src_row = &src_u32[s_row..s_row + copy_w];
        // Opaque rows copy straight through.
        if src_row.iter().all(|p| p >> 24 == 0xFF) {
            dst_u32[d_row..d_row + copy_w].copy_from_slice(src_row);
            continue;
        }
        for (i, &s) in src_row.iter().enumerate() {
            let sa = s >> 24;
            if sa == 0 {
                continue;
            }
            let d = dst_u32[d_row + i];
            let inv = 255 - sa;
            let channel = |shift: u32| {
                let sc = (s >> shift) & 0xFF;
                let dc = (d >> shift) & 0xFF;
                (sc + (dc * inv + 127) / 255).min(255)
            };
            dst_u32[d_row + i] = (channel(24) << 24) | (channel(16) << 16) | (channel(8) << 8) | channel(0);
        }
    }

    Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
}

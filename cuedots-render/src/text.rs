use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font, FontArc, FontVec, Glyph, PxScale, ScaleFont, point};
use tiny_skia::{Pixmap, PremultipliedColorU8};

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("cannot read font {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable font")]
    Invalid { path: PathBuf },
    #[error("built-in font is corrupt")]
    Builtin,
}

/// DejaVu Sans, used when no font file is configured.
static BUILTIN_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
    let bytes = std::fs::read(path).map_err(|source| FontError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let font = FontVec::try_from_vec(bytes).map_err(|_| FontError::Invalid {
        path: path.to_path_buf(),
    })?;
    Ok(FontArc::new(font))
}

pub fn builtin_font() -> Result<FontArc, FontError> {
    FontArc::try_from_slice(BUILTIN_FONT).map_err(|_| FontError::Builtin)
}

/// The configured font, or the built-in one when `path` is `None`.
pub fn resolve_font(path: Option<&Path>) -> Result<FontArc, FontError> {
    match path {
        Some(path) => load_font(path),
        None => builtin_font(),
    }
}

/// Rasterises `text` into a tight, transparent, premultiplied pixmap.
/// Lines are split on `\n` and centred on the widest one. Returns `None`
/// when nothing in the text has an outline.
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: [u8; 3]) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);
    let line_height = sf.height() + sf.line_gap();

    // Lay out each line at x = 0, baseline at its ascent.
    let mut lines: Vec<(f32, Vec<Glyph>)> = Vec::new();
    for (row, line) in text.lines().enumerate() {
        let baseline = sf.ascent() + row as f32 * line_height;
        let mut pen_x = 0.0f32;
        let mut glyphs = Vec::new();
        let mut prev = None;
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(prev) = prev {
                pen_x += sf.kern(prev, id);
            }
            glyphs.push(Glyph {
                id,
                scale,
                position: point(pen_x, baseline),
            });
            pen_x += sf.h_advance(id);
            prev = Some(id);
        }
        lines.push((pen_x, glyphs));
    }

    let widest = lines.iter().map(|(w, _)| *w).fold(0.0f32, f32::max);
    let outlines: Vec<_> = lines
        .into_iter()
        .flat_map(|(width, glyphs)| {
            let shift = (widest - width) * 0.5;
            glyphs.into_iter().map(move |mut g| {
                g.position.x += shift;
                g
            })
        })
        .filter_map(|g| font.outline_glyph(g))
        .collect();

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    if outlines.is_empty() {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x.floor()) as i32;
            let iy = (y as f32 + b.min.y - min_y.floor()) as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = cov.clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let premul = |c: u8| (c as f32 * a) as u8;
            let bg = dst[i];
            // Porter-Duff over in premultiplied space.
            let inv = 1.0 - a;
            let over = |s: u8, d: u8| s.saturating_add((d as f32 * inv) as u8);
            let r = over(premul(color[0]), bg.red());
            let g = over(premul(color[1]), bg.green());
            let b = over(premul(color[2]), bg.blue());
            let alpha = over(sa, bg.alpha());
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(alpha), g.min(alpha), b.min(alpha), alpha) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Rendered strings, keyed by their text. Strings without any visible glyph
/// are cached as `None`.
pub struct TextCache {
    font: FontArc,
    size_px: f32,
    color: [u8; 3],
    map: HashMap<String, Option<Arc<Pixmap>>>,
}

impl TextCache {
    pub fn new(font: FontArc, size_px: f32, color: [u8; 3]) -> Self {
        Self {
            font,
            size_px,
            color,
            map: HashMap::new(),
        }
    }

    pub fn get_or_render(&mut self, text: &str) -> Option<Arc<Pixmap>> {
        if let Some(p) = self.map.get(text) {
            return p.clone();
        }
        let pm = render_text_pixmap(text, self.size_px, &self.font, self.color).map(Arc::new);
        self.map.insert(text.to_string(), pm.clone());
        pm
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

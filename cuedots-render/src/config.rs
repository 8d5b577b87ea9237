use std::path::PathBuf;

use serde::Deserialize;

/// Geometry and appearance of everything drawn on screen. Sizes are in
/// degrees of visual angle unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub pixels_per_degree: f32,
    pub background: [u8; 3],
    pub foreground: [u8; 3],
    pub fixation_radius: f32,
    pub cue_size: f32,
    pub n_dots: usize,
    /// Frames a dot lives before it is moved to a fresh random spot.
    pub dot_life: u32,
    /// Diameter of the circular dot field.
    pub field_size: f32,
    /// Displacement per frame.
    pub dot_speed: f32,
    pub dot_size_px: f32,
    pub seed: u64,
    /// TrueType/OpenType file for text screens. The built-in DejaVu Sans
    /// is used when unset.
    pub font_path: Option<PathBuf>,
    pub font_size_px: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixels_per_degree: 40.0,
            background: [128, 128, 128],
            foreground: [255, 255, 255],
            fixation_radius: 0.1,
            cue_size: 1.0,
            n_dots: 30,
            dot_life: 20,
            field_size: 5.0,
            dot_speed: 0.01,
            dot_size_px: 3.0,
            seed: 0,
            font_path: None,
            font_size_px: 28.0,
        }
    }
}

impl RenderConfig {
    pub fn px(&self, degrees: f32) -> f32 {
        degrees * self.pixels_per_degree
    }

    pub fn field_radius_px(&self) -> f32 {
        self.px(self.field_size) * 0.5
    }

    pub fn speed_px(&self) -> f32 {
        self.px(self.dot_speed)
    }
}

pub mod config;
pub mod dots;
pub mod render;
pub mod text;

pub use config::RenderConfig;
pub use dots::DotField;
pub use render::{DrawStats, RenderError, SkiaRenderer};
pub use text::{FontError, TextCache, load_font, render_text_pixmap};

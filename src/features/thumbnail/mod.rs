mod renderer;

pub use renderer::{THUMB_HEIGHT, THUMB_WIDTH, fallback_color, prewarm_fonts, render_thumbnail};

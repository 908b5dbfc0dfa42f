mod trimmer;

pub use trimmer::{PREVIEW_SAMPLE_RATE, PREVIEW_WINDOW_SECS, trim_preview};

mod parser;

pub use parser::{BeatmapMetadata, parse_metadata};

mod reader;

pub use reader::{BeatmapArchive, EntryRole};

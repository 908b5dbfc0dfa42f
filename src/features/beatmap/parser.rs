//! 谱面定义（.osu）解析。
//!
//! 只提取资产生成关心的字段。定义文件来自用户上传，质量参差不齐，
//! 因此解析绝不报错：单个字段坏掉只影响该字段本身，退回文档化的默认值。

/// 从谱面定义中提取出的元数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatmapMetadata {
    /// `[Events]` 中声明的背景图片文件名
    pub background_filename: Option<String>,
    /// `[General]` 中声明的主音轨文件名
    pub audio_filename: Option<String>,
    /// 试听起始偏移（毫秒）；-1 表示从头开始
    pub preview_time_ms: i64,
    /// 曲名（仅用于日志与上传回执）
    pub title: Option<String>,
    /// 艺术家（仅用于日志与上传回执）
    pub artist: Option<String>,
}

impl Default for BeatmapMetadata {
    fn default() -> Self {
        Self {
            background_filename: None,
            audio_filename: None,
            preview_time_ms: -1,
            title: None,
            artist: None,
        }
    }
}

/// 解析谱面定义文本。
///
/// 行导向、分段（`[Section]`）格式。任何缺失或畸形字段都按字段级降级处理，
/// 不会使整体解析失败。
pub fn parse_metadata(text: &str) -> BeatmapMetadata {
    let mut meta = BeatmapMetadata::default();
    let mut section = Section::None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = Section::from_name(name);
            continue;
        }

        match section {
            Section::General => parse_general_line(line, &mut meta),
            Section::Metadata => parse_metadata_line(line, &mut meta),
            Section::Events => parse_event_line(line, &mut meta),
            Section::None | Section::Other => {}
        }
    }

    meta
}

#[derive(Debug, Clone, Copy)]
enum Section {
    None,
    General,
    Metadata,
    Events,
    Other,
}

impl Section {
    fn from_name(name: &str) -> Self {
        match name {
            "General" => Section::General,
            "Metadata" => Section::Metadata,
            "Events" => Section::Events,
            _ => Section::Other,
        }
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

fn parse_general_line(line: &str, meta: &mut BeatmapMetadata) {
    let Some((key, value)) = split_key_value(line) else {
        return;
    };
    match key {
        "AudioFilename" => {
            if !value.is_empty() {
                meta.audio_filename = Some(value.to_string());
            }
        }
        "PreviewTime" => match value.parse::<i64>() {
            Ok(ms) => meta.preview_time_ms = ms,
            Err(_) => {
                tracing::debug!("PreviewTime 字段无法解析，保留默认值: {value:?}");
            }
        },
        _ => {}
    }
}

fn parse_metadata_line(line: &str, meta: &mut BeatmapMetadata) {
    let Some((key, value)) = split_key_value(line) else {
        return;
    };
    if value.is_empty() {
        return;
    }
    match key {
        "Title" => meta.title = Some(value.to_string()),
        "Artist" => meta.artist = Some(value.to_string()),
        _ => {}
    }
}

/// `[Events]` 段：背景声明形如 `0,0,"bg.jpg",0,0`（文件名可不带引号）。
fn parse_event_line(line: &str, meta: &mut BeatmapMetadata) {
    if !line.starts_with("0,0,") {
        return;
    }
    let mut parts = line.splitn(4, ',');
    let filename = parts.nth(2).map(|s| s.trim().trim_matches('"'));
    if let Some(name) = filename
        && !name.is_empty()
    {
        meta.background_filename = Some(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::parse_metadata;

    const FULL_DEFINITION: &str = r#"osu file format v14

[General]
AudioFilename: audio.mp3
AudioLeadIn: 0
PreviewTime: 52421
Countdown: 1

[Metadata]
Title:Night of Knights
Artist:beatMARIO
Creator:someone

[Events]
//Background and Video events
0,0,"bg.jpg",0,0
//Break Periods
2,73315,76664

[HitObjects]
256,192,1000,1,0,0:0:0:0:
"#;

    #[test]
    fn parses_all_asset_fields() {
        let meta = parse_metadata(FULL_DEFINITION);
        assert_eq!(meta.audio_filename.as_deref(), Some("audio.mp3"));
        assert_eq!(meta.preview_time_ms, 52421);
        assert_eq!(meta.background_filename.as_deref(), Some("bg.jpg"));
        assert_eq!(meta.title.as_deref(), Some("Night of Knights"));
        assert_eq!(meta.artist.as_deref(), Some("beatMARIO"));
    }

    #[test]
    fn missing_preview_time_defaults_to_minus_one() {
        let meta = parse_metadata("[General]\nAudioFilename: a.mp3\n");
        assert_eq!(meta.preview_time_ms, -1);
        assert_eq!(meta.audio_filename.as_deref(), Some("a.mp3"));
    }

    #[test]
    fn malformed_field_degrades_alone() {
        // PreviewTime 坏掉不影响同段其他字段与后续段落
        let text = "[General]\nPreviewTime: soon\nAudioFilename: a.ogg\n[Events]\n0,0,\"x.png\",0,0\n";
        let meta = parse_metadata(text);
        assert_eq!(meta.preview_time_ms, -1);
        assert_eq!(meta.audio_filename.as_deref(), Some("a.ogg"));
        assert_eq!(meta.background_filename.as_deref(), Some("x.png"));
    }

    #[test]
    fn unquoted_background_is_accepted() {
        let meta = parse_metadata("[Events]\n0,0,bg stage.png,0,0\n");
        assert_eq!(meta.background_filename.as_deref(), Some("bg stage.png"));
    }

    #[test]
    fn video_and_break_events_are_ignored() {
        let text = "[Events]\nVideo,100,\"clip.avi\"\n2,1000,2000\n";
        let meta = parse_metadata(text);
        assert!(meta.background_filename.is_none());
    }

    #[test]
    fn empty_input_yields_defaults() {
        let meta = parse_metadata("");
        assert_eq!(meta, super::BeatmapMetadata::default());
    }
}

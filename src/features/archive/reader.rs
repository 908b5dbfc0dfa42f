use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::AssetGenError;

/// 谱面压缩包内音频条目的扩展名集合
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "m4a"];

/// 谱面压缩包内图片条目的扩展名集合
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// 谱面定义文件扩展名
const DEFINITION_EXTENSION: &str = "osu";

/// 压缩包条目的角色分类。
///
/// 渲染/裁剪代码只依赖角色语义，不直接接触扩展名启发式，
/// 扩展名集合的细节收敛在本模块内部。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// 谱面定义文本（.osu）
    Definition,
    /// 背景图片候选
    Background,
    /// 主音轨候选
    Audio,
}

impl EntryRole {
    fn matches_extension(self, ext: &str) -> bool {
        match self {
            EntryRole::Definition => ext == DEFINITION_EXTENSION,
            EntryRole::Background => IMAGE_EXTENSIONS.contains(&ext),
            EntryRole::Audio => AUDIO_EXTENSIONS.contains(&ext),
        }
    }
}

/// 已打开的谱面压缩包（osz，即 zip 容器）。
///
/// 只在单次生成过程中短暂持有，不做跨请求缓存。条目顺序不做任何假设：
/// 同角色存在多个候选时，取第一个命中的条目。
pub struct BeatmapArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl BeatmapArchive {
    /// 从内存字节打开压缩包，无法解析时返回 `CorruptArchive`。
    pub fn open(bytes: Vec<u8>) -> Result<Self, AssetGenError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    /// 压缩包内条目数量（含目录项）。
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// 按角色查找第一个命中的条目名。
    pub fn find_by_role(&mut self, role: EntryRole) -> Option<String> {
        for index in 0..self.archive.len() {
            let Ok(entry) = self.archive.by_index(index) else {
                continue;
            };
            if !entry.is_file() {
                continue;
            }
            let name = normalize_entry_name(entry.name());
            if let Some(ext) = extension_of(&name)
                && role.matches_extension(&ext)
            {
                return Some(name);
            }
        }
        None
    }

    /// 按角色读取第一个命中的条目，返回（条目名, 内容）。
    pub fn read_by_role(&mut self, role: EntryRole) -> Option<(String, Vec<u8>)> {
        let name = self.find_by_role(role)?;
        let data = self.read_by_name(&name)?;
        Some((name, data))
    }

    /// 按名称读取条目内容。
    ///
    /// 名称来自谱面定义内的声明（如背景文件名），匹配时不区分大小写、
    /// 统一路径分隔符；全路径未命中时退化为按文件名（basename）匹配。
    pub fn read_by_name(&mut self, declared: &str) -> Option<Vec<u8>> {
        let declared_norm = normalize_entry_name(declared);
        let declared_base = basename_of(&declared_norm);

        let mut full_match: Option<usize> = None;
        let mut base_match: Option<usize> = None;
        for index in 0..self.archive.len() {
            let Ok(entry) = self.archive.by_index(index) else {
                continue;
            };
            if !entry.is_file() {
                continue;
            }
            let name = normalize_entry_name(entry.name());
            if name.eq_ignore_ascii_case(&declared_norm) {
                full_match = Some(index);
                break;
            }
            if base_match.is_none() && basename_of(&name).eq_ignore_ascii_case(declared_base) {
                base_match = Some(index);
            }
        }

        let index = full_match.or(base_match)?;
        self.read_index(index)
    }

    fn read_index(&mut self, index: usize) -> Option<Vec<u8>> {
        let mut entry = match self.archive.by_index(index) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("读取压缩包条目 #{index} 失败: {e}");
                return None;
            }
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut data) {
            tracing::debug!("解压条目 {} 失败: {e}", entry.name());
            return None;
        }
        Some(data)
    }
}

/// 统一 zip 条目路径：反斜杠归一为正斜杠，去掉前导 "./"。
fn normalize_entry_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(normalized)
}

fn basename_of(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn extension_of(name: &str) -> Option<String> {
    let base = basename_of(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

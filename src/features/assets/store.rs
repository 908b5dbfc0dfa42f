//! 生成资产的磁盘缓存。
//!
//! 每个 `(谱面集 ID, 资产种类)` 对应固定子目录下的一个文件；
//! 文件存在与否就是"生成成功与否"的唯一事实来源。不存在时无法区分
//! "尚未生成"与"生成失败"，两者对调用方都表现为缓存缺失。

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AssetGenError;

/// 资产种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// 160x120 缩略图
    Thumbnail,
    /// 10 秒试听
    Preview,
}

impl AssetKind {
    /// 缓存根目录下的固定子目录名
    pub fn subdir(self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "thumbnails",
            AssetKind::Preview => "previews",
        }
    }

    /// 缓存文件名（与对外 URL 中的文件名一致）
    pub fn file_name(self, beatmapset_id: i64) -> String {
        match self {
            AssetKind::Thumbnail => format!("{beatmapset_id}l.jpg"),
            AssetKind::Preview => format!("{beatmapset_id}.mp3"),
        }
    }

    /// 对外响应的 Content-Type
    pub fn content_type(self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "image/jpeg",
            AssetKind::Preview => "audio/mpeg",
        }
    }
}

/// 资产缓存存储。
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 创建缓存目录结构（幂等）。
    pub fn ensure_layout(&self) -> Result<(), AssetGenError> {
        for kind in [AssetKind::Thumbnail, AssetKind::Preview] {
            fs::create_dir_all(self.root.join(kind.subdir()))?;
        }
        Ok(())
    }

    /// 缓存条目的完整路径。
    pub fn path_for(&self, beatmapset_id: i64, kind: AssetKind) -> PathBuf {
        self.root
            .join(kind.subdir())
            .join(kind.file_name(beatmapset_id))
    }

    /// 缓存条目是否存在。
    pub fn exists(&self, beatmapset_id: i64, kind: AssetKind) -> bool {
        self.path_for(beatmapset_id, kind).is_file()
    }

    /// 读取缓存条目；缺失（或读取失败）返回 None。
    ///
    /// 纯读取：绝不触发生成。
    pub fn get(&self, beatmapset_id: i64, kind: AssetKind) -> Option<Vec<u8>> {
        fs::read(self.path_for(beatmapset_id, kind)).ok()
    }

    /// 原子写入缓存条目：先写临时文件再 rename。
    ///
    /// 临时文件名带随机盐，近乎同时的两次生成各写各的临时文件，
    /// rename 后到的覆盖先到的；两份都是完整文件，不会出现被撕裂的半成品。
    /// 重复上传同一谱面集时也走同一路径实现覆盖。
    pub fn put(
        &self,
        beatmapset_id: i64,
        kind: AssetKind,
        bytes: &[u8],
    ) -> Result<(), AssetGenError> {
        let dir = self.root.join(kind.subdir());
        fs::create_dir_all(&dir)?;

        let final_path = dir.join(kind.file_name(beatmapset_id));
        let tmp_path = dir.join(format!(
            ".{}.{}.tmp",
            kind.file_name(beatmapset_id),
            Uuid::new_v4().simple()
        ));

        fs::write(&tmp_path, bytes)?;
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            // rename 失败时不留垃圾临时文件
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

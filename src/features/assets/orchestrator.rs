//! 资产生成编排。
//!
//! 上传链路只负责把压缩包字节丢进来（fire-and-forget），这里完成其余所有工作：
//! 判断是否需要（重新）生成、从压缩包收集素材、调用渲染/裁剪、落盘。
//! 任何失败都在本模块内收敛为日志，调用方既不等待也感知不到失败：
//! 失败的种类保持缓存缺失状态，对外表现为后续资源请求的 404。

use std::time::Instant;

use crate::features::archive::{BeatmapArchive, EntryRole};
use crate::features::beatmap::{BeatmapMetadata, parse_metadata};
use crate::features::preview::trim_preview;
use crate::features::thumbnail::render_thumbnail;
use crate::state::AppState;

use super::store::{AssetKind, AssetStore};

/// 异步生成入口：由上传处理器 `tokio::spawn` 调度。
///
/// 渲染与音频编码是 CPU 密集型操作，放进 `spawn_blocking` 并用信号量
/// 限制并发数，避免高峰期上传把 worker 线程池吃满。
pub async fn generate_assets(state: AppState, beatmapset_id: i64, archive_bytes: Vec<u8>) {
    let permit = match state.generate_semaphore.clone().acquire_owned().await {
        Ok(p) => p,
        // 信号量只在进程退出时关闭，此时放弃生成是安全的（可重新触发）
        Err(_) => return,
    };

    let store = state.asset_store.clone();
    let optimize_speed = state.optimize_speed;
    let join = tokio::task::spawn_blocking(move || {
        ensure_generated(&store, beatmapset_id, archive_bytes, optimize_speed);
    })
    .await;

    if let Err(e) = join {
        tracing::warn!("谱面集 {} 资产生成任务异常退出: {}", beatmapset_id, e);
    }
    drop(permit);
}

/// 同步生成核心（幂等）。
///
/// 每个资产种类独立推进：缓存已存在则跳过；音频失败不影响缩略图，反之亦然。
/// 压缩包本身打不开时两个种类一起放弃。
pub fn ensure_generated(
    store: &AssetStore,
    beatmapset_id: i64,
    archive_bytes: Vec<u8>,
    optimize_speed: bool,
) {
    let need_thumbnail = !store.exists(beatmapset_id, AssetKind::Thumbnail);
    let need_preview = !store.exists(beatmapset_id, AssetKind::Preview);
    if !need_thumbnail && !need_preview {
        tracing::debug!("谱面集 {} 资产已齐备，跳过生成", beatmapset_id);
        return;
    }

    let t_total = Instant::now();

    let mut archive = match BeatmapArchive::open(archive_bytes) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("谱面集 {} 压缩包无法打开，放弃生成: {}", beatmapset_id, e);
            return;
        }
    };

    // 第一个谱面定义是元数据的权威来源；没有定义文件时用默认值继续，
    // 仍可能通过扩展名探测找到可用的背景与音轨。
    let meta = archive
        .read_by_role(EntryRole::Definition)
        .map(|(name, data)| {
            tracing::debug!("谱面集 {} 使用定义文件 {}", beatmapset_id, name);
            parse_metadata(&String::from_utf8_lossy(&data))
        })
        .unwrap_or_default();

    if need_thumbnail {
        generate_thumbnail(store, &mut archive, &meta, beatmapset_id, optimize_speed);
    }

    if need_preview {
        generate_preview(store, &mut archive, &meta, beatmapset_id);
    }

    tracing::info!(
        "谱面集 {} 资产生成完成，耗时 {}ms",
        beatmapset_id,
        t_total.elapsed().as_millis()
    );
}

/// 背景素材定位：定义里声明的文件名优先于扩展名猜测。
fn locate_background(archive: &mut BeatmapArchive, meta: &BeatmapMetadata) -> Option<Vec<u8>> {
    if let Some(declared) = meta.background_filename.as_deref()
        && let Some(data) = archive.read_by_name(declared)
    {
        return Some(data);
    }
    archive
        .read_by_role(EntryRole::Background)
        .map(|(_, data)| data)
}

/// 音轨素材定位：返回（条目名, 内容），条目名用作解码扩展名提示。
fn locate_audio(archive: &mut BeatmapArchive, meta: &BeatmapMetadata) -> Option<(String, Vec<u8>)> {
    if let Some(declared) = meta.audio_filename.as_deref()
        && let Some(data) = archive.read_by_name(declared)
    {
        return Some((declared.to_string(), data));
    }
    archive.read_by_role(EntryRole::Audio)
}

fn generate_thumbnail(
    store: &AssetStore,
    archive: &mut BeatmapArchive,
    meta: &BeatmapMetadata,
    beatmapset_id: i64,
    optimize_speed: bool,
) {
    let t = Instant::now();
    let background = locate_background(archive, meta);

    match render_thumbnail(background.as_deref(), beatmapset_id, optimize_speed) {
        Ok(bytes) => {
            if let Err(e) = store.put(beatmapset_id, AssetKind::Thumbnail, &bytes) {
                tracing::warn!("谱面集 {} 缩略图写入失败: {}", beatmapset_id, e);
                return;
            }
            tracing::info!(
                "谱面集 {} 缩略图已生成（{}字节，{}ms，背景: {}）",
                beatmapset_id,
                bytes.len(),
                t.elapsed().as_millis(),
                if background.is_some() { "谱面图片" } else { "纯色兜底" }
            );
        }
        Err(e) => {
            tracing::warn!("谱面集 {} 缩略图渲染失败: {}", beatmapset_id, e);
        }
    }
}

fn generate_preview(
    store: &AssetStore,
    archive: &mut BeatmapArchive,
    meta: &BeatmapMetadata,
    beatmapset_id: i64,
) {
    let t = Instant::now();
    let Some((entry_name, audio)) = locate_audio(archive, meta) else {
        tracing::warn!("谱面集 {} 未找到音轨条目，跳过试听生成", beatmapset_id);
        return;
    };

    let ext_hint = entry_name.rsplit_once('.').map(|(_, ext)| ext.to_string());
    match trim_preview(&audio, ext_hint.as_deref(), meta.preview_time_ms) {
        Ok(bytes) => {
            if let Err(e) = store.put(beatmapset_id, AssetKind::Preview, &bytes) {
                tracing::warn!("谱面集 {} 试听写入失败: {}", beatmapset_id, e);
                return;
            }
            tracing::info!(
                "谱面集 {} 试听已生成（{}字节，{}ms，起点 {}ms）",
                beatmapset_id,
                bytes.len(),
                t.elapsed().as_millis(),
                meta.preview_time_ms
            );
        }
        Err(e) => {
            tracing::warn!("谱面集 {} 试听生成失败: {}", beatmapset_id, e);
        }
    }
}

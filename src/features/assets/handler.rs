use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};

use crate::{error::AppError, state::AppState};

use super::store::AssetKind;

/// 生成资产的缓存头。
///
/// 资产可能随重新上传被覆盖，不标 immutable；一天的 max-age 足以
/// 挡掉绝大多数重复回源。
const ASSET_CACHE_CONTROL: &str = "public, max-age=86400";

/// 资产服务路由（挂载在根路径，与主站缩略图/试听 URL 形状保持一致）。
pub fn create_asset_router() -> Router<AppState> {
    Router::new()
        .route("/thumb/:file", get(get_thumbnail))
        .route("/preview/:file", get(get_preview))
}

/// 从 `{id}l.jpg` 形式的文件名里解出谱面集 ID。
fn parse_asset_file_name(file: &str, suffix: &str) -> Option<i64> {
    let id_part = file.strip_suffix(suffix)?;
    if id_part.is_empty() || !id_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id_part.parse::<i64>().ok()
}

/// 读取缓存并组装响应。缓存缺失统一回 404：对外不区分
/// "尚未生成"与"生成失败"。
async fn serve_cached_asset(
    state: &AppState,
    beatmapset_id: i64,
    kind: AssetKind,
) -> Result<Response, AppError> {
    let path = state.asset_store.path_for(beatmapset_id, kind);
    let bytes = tokio::fs::read(path).await.map_err(|_| {
        AppError::NotFound(format!(
            "{} {}",
            kind.subdir().trim_end_matches('s'),
            beatmapset_id
        ))
    })?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(kind.content_type()),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static(ASSET_CACHE_CONTROL),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/thumb/{file}",
    summary = "获取谱面集缩略图",
    description = "返回缓存中的 160x120 JPEG 缩略图。兼容旧式 `{id}.jpg` 路径（永久跳转到规范路径）。缓存缺失返回 404。",
    params(("file" = String, Path, description = "`{beatmapset_id}l.jpg` 形式的文件名")),
    responses(
        (status = 200, description = "JPEG bytes"),
        (status = 308, description = "旧式文件名跳转到规范路径"),
        (status = 404, description = "缓存缺失", body = crate::error::ProblemDetails)
    ),
    tag = "Assets"
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    // 规范形式 `{id}l.jpg` 先于旧式 `{id}.jpg` 判断（后者的后缀是前者的子串）
    if let Some(id) = parse_asset_file_name(&file, "l.jpg") {
        return serve_cached_asset(&state, id, AssetKind::Thumbnail).await;
    }
    if let Some(id) = parse_asset_file_name(&file, ".jpg") {
        return Ok(Redirect::permanent(&format!("/thumb/{id}l.jpg")).into_response());
    }
    Err(AppError::NotFound(format!("thumb {file}")))
}

#[utoipa::path(
    get,
    path = "/preview/{file}",
    summary = "获取谱面集试听音频",
    description = "返回缓存中的 10 秒 MP3 试听。缓存缺失返回 404（包括生成失败的情况）。",
    params(("file" = String, Path, description = "`{beatmapset_id}.mp3` 形式的文件名")),
    responses(
        (status = 200, description = "MP3 bytes"),
        (status = 404, description = "缓存缺失", body = crate::error::ProblemDetails)
    ),
    tag = "Assets"
)]
pub async fn get_preview(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    if let Some(id) = parse_asset_file_name(&file, ".mp3") {
        return serve_cached_asset(&state, id, AssetKind::Preview).await;
    }
    Err(AppError::NotFound(format!("preview {file}")))
}

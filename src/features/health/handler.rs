use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::features::assets::AssetKind;
use crate::state::AppState;

/// 健康检查响应。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    #[schema(example = "ok")]
    pub status: String,
    /// 当前版本（Cargo package version）
    #[schema(example = "0.1.0")]
    pub version: String,
    /// 资产缓存目录是否就绪（缩略图与试听子目录均存在）
    pub cache_ready: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "探活端点。顺带报告资产缓存目录是否就绪：目录缺失时服务仍可响应读请求（全部 404），但生成会持续失败。",
    responses((status = 200, description = "服务健康", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let root = state.asset_store.root();
    let cache_ready = [AssetKind::Thumbnail, AssetKind::Preview]
        .iter()
        .all(|kind| root.join(kind.subdir()).is_dir());

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache_ready,
        }),
    )
}

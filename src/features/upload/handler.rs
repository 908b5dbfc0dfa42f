use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{error::AppError, features::assets::generate_assets, state::AppState};

/// 上传回执。
///
/// 只确认"压缩包已收到、生成已排队"；资产生成的成败不在这里体现，
/// 客户端通过之后的缩略图/试听请求观察结果（404 = 还没有）。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// 谱面集 ID
    pub beatmapset_id: i64,
    /// 收到的压缩包字节数
    pub size: u64,
    /// 压缩包 SHA-256 摘要（十六进制）
    pub sha256: String,
    /// 接收时间
    #[schema(value_type = String, example = "2025-08-01T12:00:00Z")]
    pub received_at: DateTime<Utc>,
}

/// 上传触发路由（挂载在 API 前缀下）。
pub fn create_upload_router() -> Router<AppState> {
    Router::new().route("/osz/:beatmapset_id", post(upload_osz))
}

#[utoipa::path(
    post,
    path = "/osz/{beatmapset_id}",
    summary = "上传谱面压缩包并触发资产生成",
    description = "请求体为原始 osz 字节。仅做字节级校验后立即返回 202，\
缩略图与试听在后台生成，生成失败不会反馈到本接口。",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    params(("beatmapset_id" = i64, Path, description = "谱面集 ID（正整数）")),
    responses(
        (status = 202, description = "已接收，生成已排队", body = UploadResponse),
        (status = 413, description = "压缩包超出大小上限", body = crate::error::ProblemDetails),
        (status = 422, description = "参数或请求体不合法", body = crate::error::ProblemDetails)
    ),
    tag = "Upload"
)]
pub async fn upload_osz(
    State(state): State<AppState>,
    Path(beatmapset_id): Path<i64>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    if beatmapset_id <= 0 {
        return Err(AppError::Validation(format!(
            "谱面集 ID 必须为正整数: {beatmapset_id}"
        )));
    }
    if body.is_empty() {
        return Err(AppError::Validation("请求体为空".to_string()));
    }
    if body.len() as u64 > state.upload_max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "压缩包 {} 字节，超出上限 {} 字节",
            body.len(),
            state.upload_max_bytes
        )));
    }

    let sha256 = hex::encode(Sha256::digest(&body));
    tracing::info!(
        "收到谱面集 {} 上传（{}字节，sha256={}），已排队生成资产",
        beatmapset_id,
        body.len(),
        &sha256[..12]
    );

    // fire-and-forget：上传响应不等待、也不感知生成结果
    tokio::spawn(generate_assets(
        state.clone(),
        beatmapset_id,
        body.to_vec(),
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            beatmapset_id,
            size: body.len() as u64,
            sha256,
            received_at: Utc::now(),
        }),
    ))
}

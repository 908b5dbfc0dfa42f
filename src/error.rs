use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 资源不存在（缓存未命中等）
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 请求体过大
    #[error("请求体过大: {0}")]
    PayloadTooLarge(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 资产生成错误
    #[error("资产生成错误: {0}")]
    AssetGen(#[from] AssetGenError),
}

/// 资产生成管线错误类型
///
/// 该错误只在生成管线内部流转：编排器把它记录到日志后静默吞掉，
/// 不会沿上传链路向调用方传播（缓存缺失统一表现为后续的 404）。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AssetGenError {
    /// 谱面压缩包无法打开
    #[error("谱面压缩包损坏: {0}")]
    CorruptArchive(String),

    /// 音频解码失败或编码格式不受支持
    #[error("音频不受支持: {0}")]
    UnsupportedAudio(String),

    /// 缩略图渲染错误
    #[error("缩略图渲染错误: {0}")]
    Render(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(String),
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 设计目标：
/// - 让所有 API 错误返回结构化 JSON，便于 SDK/调用方稳定处理
/// - 与 OpenAPI 一致（content-type = application/problem+json）
/// - 允许在不破坏主结构的前提下扩展字段（如 requestId）
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Not Found")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 404)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "NOT_FOUND")]
    pub code: String,

    /// 可选：请求追踪 ID。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AssetGen(e) => match e {
                AssetGenError::CorruptArchive(_) | AssetGenError::UnsupportedAudio(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AssetGenError::Render(_) | AssetGenError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::AssetGen(e) => match e {
                AssetGenError::CorruptArchive(_) => "CORRUPT_ARCHIVE",
                AssetGenError::UnsupportedAudio(_) => "UNSUPPORTED_AUDIO",
                AssetGenError::Render(_) => "RENDER_FAILED",
                AssetGenError::Io(_) => "ASSET_IO_FAILED",
            },
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::PAYLOAD_TOO_LARGE => "Payload Too Large",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: Some(self.to_string()),
            code: self.stable_code().to_string(),
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<zip::result::ZipError> for AssetGenError {
    fn from(err: zip::result::ZipError) -> Self {
        AssetGenError::CorruptArchive(err.to_string())
    }
}

impl From<std::io::Error> for AssetGenError {
    fn from(err: std::io::Error) -> Self {
        AssetGenError::Io(err.to_string())
    }
}

impl From<image::ImageError> for AssetGenError {
    fn from(err: image::ImageError) -> Self {
        AssetGenError::Render(err.to_string())
    }
}

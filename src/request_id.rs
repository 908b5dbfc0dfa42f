//! 请求追踪 ID。
//!
//! 每个请求进入时确定一个追踪 ID：客户端携带了合法值就沿用，
//! 否则由服务端生成。ID 写回响应头，并通过 task-local 提供给
//! 错误响应体（ProblemDetails.requestId）。

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// 追踪 ID 的请求/响应头名。
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 客户端携带 ID 的长度上限，超出按非法处理。
const MAX_CLIENT_ID_LEN: usize = 64;

/// 单个请求的追踪 ID。
#[derive(Debug, Clone)]
pub struct RequestId(String);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// 校验并接受客户端携带的 ID。
    ///
    /// 只接受受限字符集与有限长度，避免日志注入与超长头部。
    fn from_client(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let acceptable = !trimmed.is_empty()
            && trimmed.len() <= MAX_CLIENT_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        acceptable.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    static ACTIVE_REQUEST_ID: RequestId;
}

/// 当前请求上下文中的追踪 ID；请求处理任务之外返回 None。
pub fn current_request_id() -> Option<String> {
    ACTIVE_REQUEST_ID.try_with(|id| id.0.clone()).ok()
}

/// 全局追踪 ID 中间件。
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::from_client)
        .unwrap_or_else(RequestId::generate);

    req.extensions_mut().insert(id.clone());
    let header_value = HeaderValue::from_str(id.as_str()).ok();

    let mut res = ACTIVE_REQUEST_ID
        .scope(id, async move { next.run(req).await })
        .await;

    if let Some(value) = header_value {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

//! 网关错误类型
//! 路由 handler 直接返回 `Result<T, GatewayError>`，由 IntoResponse 统一映射状态码

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 缺少必需凭据，在发起任何上游调用之前返回
    #[error("missing required credential: {0}")]
    NotConfigured(&'static str),

    /// 上游连接失败或超时
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// 上游返回非预期状态码，仅透传状态、不带响应体
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// 上游响应结构不符合预期
    #[error("malformed upstream response: {0}")]
    MalformedUpstream(String),

    /// 播放鉴权 cookie 缺失或不匹配
    #[error("password required")]
    Unauthorized,

    /// 请求参数缺失
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    /// 磁盘缓存读写失败。只在边界记录日志，缓存降级为未命中，不应到达客户端
    #[error("cache io: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamStatus(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::MalformedUpstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::CacheIo(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::MalformedUpstream(e.to_string())
        } else {
            GatewayError::UpstreamUnavailable(e.to_string())
        }
    }
}

impl From<axum::http::Error> for GatewayError {
    fn from(e: axum::http::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        // 上游状态码只透传，不附加错误体
        if let GatewayError::UpstreamStatus(_) = self {
            return status.into_response();
        }

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "请求处理失败");
        }

        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_is_server_error() {
        let resp = GatewayError::NotConfigured("EMBY_API_KEY").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_unavailable_is_bad_gateway() {
        let resp = GatewayError::UpstreamUnavailable("connect refused".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upstream_status_passthrough() {
        let resp = GatewayError::UpstreamStatus(404).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_produces_401() {
        let resp = GatewayError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}

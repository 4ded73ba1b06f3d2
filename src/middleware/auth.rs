//! 播放鉴权中间件
//! 首页开放，播放与流代理要求携带约定 cookie

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::GatewayConfig;
use crate::state::AppState;

/// cookie 值与配置完全相等才放行
pub fn is_play_authorized(config: &GatewayConfig, headers: &HeaderMap) -> bool {
    let Some(raw) = headers.get("cookie").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| {
            name == config.auth_cookie_name && value == config.auth_cookie_value
        })
}

/// 播放/流路由的鉴权层
pub async fn require_play_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if is_play_authorized(&state.config, req.headers()) {
        return next.run(req).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Password required"})),
    )
        .into_response()
}

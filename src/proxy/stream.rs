//! 视频流代理
//! 透传 Range 与 200/206 状态，分块转发不落盘；上游连接随流结束/断开即释放

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use futures_core::Stream;
use tracing::{debug, error, warn};

use crate::error::GatewayError;
use crate::middleware::auth::require_play_auth;
use crate::state::AppState;

/// 转发给客户端的响应头白名单，其余一律过滤避免冲突
const FORWARD_HEADERS: &[header::HeaderName] = &[
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/api/proxy/stream/{item_id}",
        get(proxy_stream).layer(middleware::from_fn_with_state(
            state.clone(),
            require_play_auth,
        )),
    )
}

async fn proxy_stream(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let api_key = state.config.require_api_key()?;
    let stream_url = format!(
        "{}/emby/Videos/{}/stream?static=true&api_key={}",
        state.emby.base(),
        item_id,
        api_key
    );

    // 长传输不能设读超时，只限制建连时间
    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let mut req = client.get(&stream_url);
    if let Some(range) = headers.get(header::RANGE) {
        req = req.header(header::RANGE, range);
    }

    // 建连失败时快速报 502，此刻还没有任何字节发给客户端
    let upstream = req.send().await.map_err(|e| {
        error!("[STREAM] 上游连接失败 item={item_id}: {e}");
        GatewayError::UpstreamUnavailable(e.to_string())
    })?;

    let status = upstream.status();
    debug!(
        "[STREAM] item={} status={} range={}",
        item_id,
        status,
        headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
    );

    let mut builder = Response::builder().status(status);
    for name in FORWARD_HEADERS {
        if let Some(v) = upstream.headers().get(name) {
            builder = builder.header(name.clone(), v);
        }
    }
    // 告诉反代不要缓冲，直接流给客户端
    builder = builder.header("x-accel-buffering", "no");

    let body = Body::from_stream(relay_stream(upstream, item_id));
    Ok(builder.body(body)?)
}

/// 一次性会话守卫：完成、出错、客户端中途断开都会走到 Drop，
/// 上游响应随流一起释放
struct StreamSessionGuard {
    item_id: String,
}

impl Drop for StreamSessionGuard {
    fn drop(&mut self) {
        debug!("[STREAM] 会话结束 item={}", self.item_id);
    }
}

/// 按上游到达顺序逐块转发；出错时记录并终止，交由守卫收尾
fn relay_stream(
    mut upstream: reqwest::Response,
    item_id: String,
) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
    async_stream::stream! {
        let _guard = StreamSessionGuard { item_id: item_id.clone() };
        loop {
            match upstream.chunk().await {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => break,
                Err(e) => {
                    warn!("[STREAM] 传输中断 item={item_id}: {e}");
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

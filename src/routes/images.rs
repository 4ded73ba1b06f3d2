//! 图片代理路由
//! 先查磁盘缓存并应答条件请求，未命中再回源 Emby；api_key 只加在出站一侧

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error, warn};

use crate::error::GatewayError;
use crate::services::image_cache::{ImageBlobCache, ImageMeta};
use crate::state::AppState;

const CACHE_CONTROL_VALUE: &str = "public, max-age=604800";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/proxy/image", get(proxy_image))
}

/// 列表/播放响应里引用的代理图片地址
pub fn proxy_image_url(
    item_id: &str,
    image_path: &str,
    max_width: Option<u32>,
    quality: Option<u32>,
) -> String {
    let mut url = format!("/api/proxy/image?path=/Items/{item_id}/Images/{image_path}");
    if let Some(w) = max_width {
        url.push_str(&format!("&maxWidth={w}"));
    }
    if let Some(q) = quality {
        url.push_str(&format!("&quality={q}"));
    }
    url
}

async fn proxy_image(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let api_key = state.config.require_api_key()?;
    let path = query
        .get("path")
        .ok_or(GatewayError::BadRequest("path is required"))?;
    let clean_path = if path.starts_with('/') {
        path.clone()
    } else {
        format!("/{path}")
    };

    // 转发参数：剔除 path 与客户端塞进来的 api_key
    let forward_params: Vec<(String, String)> = query
        .iter()
        .filter(|(k, _)| k.as_str() != "path" && k.as_str() != "api_key")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    let if_modified_since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok());

    // 1) 磁盘缓存命中，直接在本地应答（含条件请求）
    let cache_key = state
        .image_cache
        .as_ref()
        .map(|_| ImageBlobCache::cache_key(&clean_path, &forward_params));
    if let (Some(cache), Some(key)) = (state.image_cache.as_deref(), cache_key.as_deref()) {
        if let Some((meta, bytes)) = cache.lookup(key) {
            debug!("[IMAGE] 缓存命中 {clean_path}");
            return Ok(serve_cached(meta, bytes, if_none_match, if_modified_since));
        }
    }

    // 2) 回源，出站侧补上 api_key
    let url = format!("{}/emby{}", state.emby.base(), clean_path);
    let mut req = state
        .emby
        .http()
        .get(&url)
        .query(&forward_params)
        .query(&[("api_key", api_key)]);
    if let Some(v) = if_none_match {
        req = req.header(header::IF_NONE_MATCH, v);
    }
    if let Some(v) = if_modified_since {
        req = req.header(header::IF_MODIFIED_SINCE, v);
    }

    let resp = req.send().await.map_err(|e| {
        error!("[IMAGE] 回源失败 {clean_path}: {e}");
        GatewayError::UpstreamUnavailable(e.to_string())
    })?;

    let status = resp.status();
    if status.as_u16() != 200 && status.as_u16() != 304 {
        // 其他状态只透传状态码，不带响应体
        return Ok(status.into_response());
    }

    let mut builder = Response::builder()
        .status(status)
        .header(header::CACHE_CONTROL, CACHE_CONTROL_VALUE);
    for name in [header::ETAG, header::LAST_MODIFIED, header::EXPIRES] {
        if let Some(v) = resp.headers().get(&name) {
            builder = builder.header(name, v);
        }
    }

    if status.as_u16() == 304 {
        return Ok(builder.body(Body::empty())?);
    }

    let meta = ImageMeta {
        content_type: header_string(resp.headers(), header::CONTENT_TYPE),
        etag: header_string(resp.headers(), header::ETAG),
        last_modified: header_string(resp.headers(), header::LAST_MODIFIED),
    };
    if let Some(ct) = meta.content_type.as_deref() {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }

    let bytes = resp.bytes().await.map_err(GatewayError::from)?;

    if let (Some(cache), Some(key)) = (state.image_cache.as_deref(), cache_key.as_deref()) {
        if let Err(e) = cache.store(key, &meta, &bytes) {
            warn!("[IMAGE] 缓存写入失败 {clean_path}: {e}");
        }
    }

    Ok(builder.body(Body::from(bytes))?)
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(&name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// 缓存命中的本地应答：校验头匹配时 304 空体，否则吐存储字节
fn serve_cached(
    meta: ImageMeta,
    bytes: Vec<u8>,
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
) -> Response {
    let mut builder = Response::builder().header(header::CACHE_CONTROL, CACHE_CONTROL_VALUE);
    if let Some(etag) = meta.etag.as_deref() {
        builder = builder.header(header::ETAG, etag);
    }
    if let Some(lm) = meta.last_modified.as_deref() {
        builder = builder.header(header::LAST_MODIFIED, lm);
    }

    let etag_match = meta
        .etag
        .as_deref()
        .zip(if_none_match)
        .is_some_and(|(stored, sent)| stored == sent);
    let modified_match = meta
        .last_modified
        .as_deref()
        .zip(if_modified_since)
        .is_some_and(|(stored, sent)| stored == sent);
    if etag_match || modified_match {
        return builder
            .status(StatusCode::NOT_MODIFIED)
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    if let Some(ct) = meta.content_type.as_deref() {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    builder
        .status(StatusCode::OK)
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

//! 端到端测试：用桩上游验证代理、缓存与预取行为

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emby_gate::config::GatewayConfig;
use emby_gate::emby::EmbyClient;
use emby_gate::services::image_cache::ImageBlobCache;
use emby_gate::services::tmdb::TmdbService;
use emby_gate::state::AppState;

fn test_config(emby_host: &str, cache_dir: &std::path::Path) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        emby_host: emby_host.trim_end_matches('/').to_string(),
        api_key: Some("secret-key".into()),
        user_id: None,
        tmdb_token: None,
        auth_cookie_name: "ydyd_auth".into(),
        auth_cookie_value: "1".into(),
        disk_cache_enabled: true,
        cache_dir: cache_dir.to_path_buf(),
        image_cache_max_age_days: 0,
    }
}

fn build_state(config: GatewayConfig) -> AppState {
    let emby = EmbyClient::new(&config);
    let image_cache = config
        .disk_cache_enabled
        .then(|| Arc::new(ImageBlobCache::new(config.image_cache_dir(), 0)));
    AppState {
        config: Arc::new(config),
        emby,
        tmdb: Arc::new(TmdbService::with_base(None, None, "http://127.0.0.1:9")),
        image_cache,
    }
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

// --- TMDB 预取去重 ---

#[tokio::test]
async fn concurrent_prefetch_hits_upstream_once() {
    let tmdb = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .and(query_param("query", "某剧"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"id": 42}]}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&tmdb)
        .await;
    Mock::given(method("GET"))
        .and(path("/tv/42/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "backdrops": [{"file_path": "/bd.jpg"}, {"file_path": "/bd2.jpg"}],
            "logos": [{"file_path": "/logo.png"}]
        })))
        .expect(1)
        .mount(&tmdb)
        .await;

    let service = TmdbService::with_base(Some("token".into()), None, &tmdb.uri());

    // 同一键并发触发两次，只允许一次上游搜索
    service.ensure_prefetch("某剧", "Series");
    service.ensure_prefetch("某剧", "Series");

    let mut cached = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(art) = service.cached("某剧", "Series") {
            cached = Some(art);
            break;
        }
    }

    let art = cached.expect("prefetch should populate the cache");
    assert_eq!(
        art.backdrop.as_deref(),
        Some("https://image.tmdb.org/t/p/w1280/bd.jpg")
    );
    assert_eq!(
        art.logo.as_deref(),
        Some("https://image.tmdb.org/t/p/w500/logo.png")
    );
}

#[tokio::test]
async fn zero_search_results_are_not_negative_cached() {
    let tmdb = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(2)
        .mount(&tmdb)
        .await;

    let service = TmdbService::with_base(Some("token".into()), None, &tmdb.uri());

    service.ensure_prefetch("不存在的电影", "Movie");
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if tmdb.received_requests().await.unwrap().len() == 1 {
            break;
        }
    }
    assert!(service.cached("不存在的电影", "Movie").is_none());

    // 等第一个任务彻底收尾、释放在途标记
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 未写负缓存，下一次会重试
    service.ensure_prefetch("不存在的电影", "Movie");
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if tmdb.received_requests().await.unwrap().len() == 2 {
            break;
        }
    }
}

// --- 图片代理 ---

#[tokio::test]
async fn image_proxy_caches_and_serves_conditional_requests() {
    let emby = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emby/Items/1/Images/Primary"))
        .and(query_param("api_key", "secret-key"))
        .and(query_param("maxWidth", "600"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .insert_header("etag", "\"v1\"")
                .insert_header("last-modified", "Mon, 01 Jan 2024 00:00:00 GMT")
                .set_body_bytes(b"jpegbytes".to_vec()),
        )
        .expect(1)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));

    // 首次回源并落盘。客户端带的 api_key 必须被剔除、换成服务端凭据
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/1/Images/Primary&maxWidth=600&api_key=evil")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("cache-control").unwrap(),
        "public, max-age=604800"
    );
    assert_eq!(resp.headers().get("etag").unwrap(), "\"v1\"");
    assert_eq!(body_bytes(resp).await, b"jpegbytes");

    // 校验头匹配 → 304 空体，且不再回源（expect(1) 由桩服务保证）
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/1/Images/Primary&maxWidth=600")
                .header("if-none-match", "\"v1\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(resp).await.is_empty());

    // 校验头不匹配 → 吐缓存字节
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/1/Images/Primary&maxWidth=600")
                .header("if-none-match", "\"v2\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"jpegbytes");
}

#[tokio::test]
async fn lone_sidecar_triggers_fresh_fetch() {
    let emby = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emby/Items/2/Images/Primary"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"fresh".to_vec()),
        )
        .expect(1)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&emby.uri(), dir.path());

    // 只留旁车、没有字节文件：必须按未命中回源
    let key = ImageBlobCache::cache_key("/Items/2/Images/Primary", &[]);
    let images_dir = config.image_cache_dir();
    std::fs::create_dir_all(&images_dir).unwrap();
    std::fs::write(
        images_dir.join(format!("{key}.json")),
        br#"{"content_type":"image/jpeg","etag":"\"stale\"","last_modified":null}"#,
    )
    .unwrap();

    let app = emby_gate::app(build_state(config));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/2/Images/Primary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"fresh");
}

#[tokio::test]
async fn upstream_error_status_is_propagated_without_body() {
    let emby = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emby/Items/9/Images/Primary"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/9/Images/Primary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(resp).await.is_empty());
}

// --- 流代理 ---

#[tokio::test]
async fn stream_proxy_passes_range_and_206_through() {
    let emby = MockServer::start().await;
    let payload = vec![7u8; 100];
    Mock::given(method("GET"))
        .and(path("/emby/Videos/9/stream"))
        .and(query_param("static", "true"))
        .and(query_param("api_key", "secret-key"))
        .and(header("range", "bytes=100-199"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-type", "video/mp4")
                .insert_header("content-range", "bytes 100-199/1000")
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(payload.clone()),
        )
        .expect(1)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/stream/9")
                .header("cookie", "ydyd_auth=1")
                .header("range", "bytes=100-199")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        resp.headers().get("content-range").unwrap(),
        "bytes 100-199/1000"
    );
    assert_eq!(resp.headers().get("accept-ranges").unwrap(), "bytes");
    assert_eq!(resp.headers().get("x-accel-buffering").unwrap(), "no");
    assert_eq!(body_bytes(resp).await, payload);
}

#[tokio::test]
async fn stream_proxy_requires_cookie() {
    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config("http://127.0.0.1:9", dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/stream/9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stream_proxy_fails_fast_on_connect_error() {
    let dir = tempfile::tempdir().unwrap();
    // 无人监听的端口，建连立刻失败
    let app = emby_gate::app(build_state(test_config("http://127.0.0.1:9", dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/stream/9")
                .header("cookie", "ydyd_auth=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

// --- 凭据缺失 ---

#[tokio::test]
async fn missing_api_key_is_config_error_without_upstream_call() {
    let emby = MockServer::start().await;
    // 任何到达上游的请求都算失败
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&emby.uri(), dir.path());
    config.api_key = None;
    let app = emby_gate::app(build_state(config));

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/image?path=/Items/1/Images/Primary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/stream/1")
                .header("cookie", "ydyd_auth=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/videos?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- 列表与播放 ---

#[tokio::test]
async fn home_listing_falls_back_across_sort_fields() {
    let emby = MockServer::start().await;
    // 新字段不被该服务器支持
    Mock::given(method("GET"))
        .and(path("/emby/Items"))
        .and(query_param("SortBy", "DateLastMediaAdded"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&emby)
        .await;
    Mock::given(method("GET"))
        .and(path("/emby/Items"))
        .and(query_param("SortBy", "DateLastContentAdded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [
                {"Id": "old", "Name": "旧剧", "Type": "Series",
                 "DateLastMediaAdded": "2020-01-01T00:00:00Z"},
                {"Id": "new", "Name": "新片", "Type": "Movie",
                 "DateCreated": "2024-05-01T00:00:00Z", "ProductionYear": 2024}
            ],
            "TotalRecordCount": 2
        })))
        .expect(1)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/videos?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    // 本地按时间戳重排：新片在前
    assert_eq!(items[0]["id"], "new");
    assert_eq!(items[0]["year"], 2024);
    assert!(items[0]["poster_url"]
        .as_str()
        .unwrap()
        .starts_with("/api/proxy/image?path=/Items/new/Images/Primary"));
    assert!(items[1]["backdrop_url"]
        .as_str()
        .unwrap()
        .contains("/Items/old/Images/Backdrop/0"));
}

#[tokio::test]
async fn play_degrades_to_minimal_descriptor() {
    let emby = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emby/Items/77"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/play/77")
                .header("cookie", "ydyd_auth=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body["url"], "/api/proxy/stream/77");
    assert_eq!(body["type"], "auto");
}

#[tokio::test]
async fn play_returns_masked_stream_url_and_proxied_artwork() {
    let emby = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emby/Items/55"))
        .and(query_param("api_key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "55", "Name": "某电影", "Type": "Movie", "ProductionYear": 2023
        })))
        .expect(1)
        .mount(&emby)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = emby_gate::app(build_state(test_config(&emby.uri(), dir.path())));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/play/55")
                .header("cookie", "ydyd_auth=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body["url"], "/api/proxy/stream/55");
    assert_eq!(body["type"], "Movie");
    assert_eq!(body["title"], "某电影");
    // 图片地址全部走代理，不泄露上游地址与凭据
    let backdrop = body["backdrop_url"].as_str().unwrap();
    assert!(backdrop.starts_with("/api/proxy/image?"));
    assert!(!backdrop.contains("secret-key"));
}

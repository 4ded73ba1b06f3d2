//! emby-gate 入口
//! 启动 HTTP 服务器

use tracing::{info, warn};

use emby_gate::config::GatewayConfig;
use emby_gate::state::AppState;

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GatewayConfig::from_env();

    println!(
        r#"
╔══════════════════════════════════════╗
║          emby-gate v0.1.0            ║
║     Emby 网关 · API Key 不出门       ║
╚══════════════════════════════════════╝
"#
    );
    println!("Emby 服务器: {}", config.emby_host);
    println!("监听地址:   http://{}:{}", config.host, config.port);
    println!(
        "磁盘缓存:   {}",
        if config.disk_cache_enabled { "开" } else { "关" }
    );
    println!();

    if config.api_key.is_none() {
        warn!("未检测到 EMBY_API_KEY，受保护接口将返回配置错误");
    }
    if config.tmdb_token.is_none() {
        warn!("未检测到 TMDB_READ_TOKEN，跳过 TMDB 元数据补充");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);
    let app = emby_gate::app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    info!("✅ 服务已启动: http://{}", addr);

    axum::serve(listener, app).await.expect("Server error");
}

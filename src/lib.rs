//! emby-gate 库入口
//! 前端与私有 Emby 服务器之间的网关：隐藏 API Key，代理图片/视频流，
//! 并用 TMDB 元数据补充横版背景图与 Logo

use axum::Router;
use tower_http::cors::CorsLayer;

pub mod config;
pub mod emby;
pub mod error;
pub mod mappers;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

/// 组装全部路由
pub fn app(state: state::AppState) -> Router {
    Router::new()
        .merge(routes::videos::router())
        .merge(routes::images::router())
        .merge(routes::play::router(&state))
        .merge(proxy::stream::router(&state))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

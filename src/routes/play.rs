//! 播放描述路由
//! 返回掩码后的流代理地址；详情或补图失败只降级、不拒绝播放

use axum::{
    extract::{Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::middleware::auth::require_play_auth;
use crate::routes::images::proxy_image_url;
use crate::state::AppState;
use crate::types::api::PlayInfo;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/api/play/{item_id}",
        get(play_info).layer(middleware::from_fn_with_state(
            state.clone(),
            require_play_auth,
        )),
    )
}

async fn play_info(State(state): State<AppState>, Path(item_id): Path<String>) -> Json<PlayInfo> {
    match build_play_info(&state, &item_id).await {
        Ok(info) => Json(info),
        Err(e) => {
            warn!("[PLAY] 详情获取失败 item={item_id}，降级为最小描述: {e}");
            Json(PlayInfo::minimal(&item_id))
        }
    }
}

async fn build_play_info(state: &AppState, item_id: &str) -> Result<PlayInfo, GatewayError> {
    let item = state.emby.item_detail(item_id).await?;

    let mut info = PlayInfo {
        url: format!("/api/proxy/stream/{item_id}"),
        item_type: item.item_type.clone(),
        series_id: item.series_id.clone(),
        season_id: item.season_id.clone(),
        parent_id: item.parent_id.clone(),
        backdrop_url: Some(proxy_image_url(&item.id, "Backdrop/0", Some(1600), Some(80))),
        poster_url: Some(proxy_image_url(&item.id, "Primary", Some(900), Some(90))),
        logo_url: Some(proxy_image_url(&item.id, "Logo", Some(900), Some(90))),
        title: item.name.clone(),
        parent_index_number: item.parent_index_number,
        index_number: item.index_number,
    };

    // 单集用所属剧集名查 TMDB；剧集详情拉不到就按原名继续
    let mut target_name = item.name.clone().unwrap_or_default();
    let mut target_kind = item.item_type.clone().unwrap_or_default();
    if target_kind == "Episode" {
        if let Some(ref series_id) = item.series_id {
            match state.emby.item_detail(series_id).await {
                Ok(series) => {
                    if let Some(name) = series.name {
                        target_name = name;
                    }
                    target_kind = "Series".into();
                }
                Err(e) => debug!("[PLAY] 剧集详情获取失败 series={series_id}: {e}"),
            }
        }
    }

    match state.tmdb.cached(&target_name, &target_kind) {
        Some(art) if art.backdrop.is_some() || art.logo.is_some() => {
            if let Some(backdrop) = art.backdrop {
                info.backdrop_url = Some(backdrop);
            }
            if let Some(logo) = art.logo {
                info.logo_url = Some(logo);
            }
        }
        _ => state.tmdb.ensure_prefetch(&target_name, &target_kind),
    }

    Ok(info)
}

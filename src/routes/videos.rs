//! 列表路由
//! 首页取最近的电影/剧集并用 TMDB 补图；seriesId 模式按三级兜底拉全集并排序

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::error::GatewayError;
use crate::mappers::episode::{episode_sort_key, extract_season_episode, home_sort_timestamp};
use crate::routes::images::proxy_image_url;
use crate::state::AppState;
use crate::types::api::{VideoList, VideoSummary};
use crate::types::emby::EmbyItem;

const LIST_FIELDS: &str = "Overview,PremiereDate,AirDays,SortName";
/// 首页排序字段按新旧 Emby 逐个尝试
const HOME_SORT_CANDIDATES: &[&str] =
    &["DateLastMediaAdded", "DateLastContentAdded", "DateCreated"];
const FALLBACK_LIMIT: &str = "2000";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/videos", get(list_videos))
}

#[derive(Debug, Default, Deserialize)]
struct VideosQuery {
    limit: Option<i64>,
    #[serde(rename = "seriesId")]
    series_id: Option<String>,
}

fn to_params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn unique_by_id(raw: Vec<EmbyItem>) -> Vec<EmbyItem> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .filter(|it| !it.id.is_empty() && seen.insert(it.id.clone()))
        .collect()
}

async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideosQuery>,
) -> Result<Json<VideoList>, GatewayError> {
    let series_id = query.series_id.filter(|s| !s.is_empty());
    let is_series_listing = series_id.is_some();

    let items = match series_id {
        Some(ref sid) => collect_series_episodes(&state, sid).await?,
        None => collect_home_items(&state, query.limit.unwrap_or(10)).await?,
    };

    let mut videos = Vec::with_capacity(items.len());
    for item in &items {
        // 首页条目优先用 TMDB 图；未命中触发后台预取，不阻塞本次响应
        let mut tmdb_backdrop = None;
        let mut tmdb_logo = None;
        if !is_series_listing {
            let name = item.name.as_deref().unwrap_or("");
            let kind = item.item_type.as_deref().unwrap_or("");
            if let Some(art) = state.tmdb.cached(name, kind) {
                tmdb_backdrop = art.backdrop;
                tmdb_logo = art.logo;
            }
            if tmdb_backdrop.is_none() && tmdb_logo.is_none() {
                state.tmdb.ensure_prefetch(name, kind);
            }
        }

        let (season, episode) = if is_series_listing {
            extract_season_episode(item)
        } else {
            (None, None)
        };

        videos.push(VideoSummary {
            id: item.id.clone(),
            title: item.name.clone(),
            item_type: item.item_type.clone(),
            poster_url: proxy_image_url(&item.id, "Primary", Some(600), Some(90)),
            backdrop_url: tmdb_backdrop
                .unwrap_or_else(|| proxy_image_url(&item.id, "Backdrop/0", Some(1600), Some(80))),
            logo_url: tmdb_logo
                .unwrap_or_else(|| proxy_image_url(&item.id, "Logo", Some(700), Some(90))),
            year: item.production_year,
            air_days: item.air_days.clone(),
            parent_index_number: season,
            index_number: episode,
        });
    }

    Ok(Json(VideoList { items: videos }))
}

/// 首页：逐个尝试排序字段，全部失败才算上游不可用；拿到后按本地时间戳重排
async fn collect_home_items(
    state: &AppState,
    limit: i64,
) -> Result<Vec<EmbyItem>, GatewayError> {
    let limit = limit.to_string();
    let base = [
        ("Recursive", "true"),
        ("Fields", LIST_FIELDS),
        ("IncludeItemTypes", "Series,Movie"),
        ("SortOrder", "Descending"),
        ("Limit", limit.as_str()),
    ];

    let mut page = None;
    for sort_by in HOME_SORT_CANDIDATES {
        let mut params = to_params(&base);
        params.push(("SortBy".into(), sort_by.to_string()));
        match state.emby.items(&params).await {
            Ok(p) => {
                page = Some(p);
                break;
            }
            Err(e @ GatewayError::NotConfigured(_)) => return Err(e),
            Err(e) => warn!("[VIDEOS] SortBy={sort_by} 拉取失败: {e}"),
        }
    }

    let mut items = page
        .ok_or_else(|| GatewayError::UpstreamUnavailable("所有排序字段都拉取失败".into()))?
        .items;
    items.sort_by_key(|it| std::cmp::Reverse(home_sort_timestamp(it)));
    Ok(items)
}

/// 剧集列表三级兜底：
/// 1) Show Episodes 分页；2) 结果可疑时按 Season 逐季拉；3) 仍可疑时递归查全部视频
async fn collect_series_episodes(
    state: &AppState,
    series_id: &str,
) -> Result<Vec<EmbyItem>, GatewayError> {
    let mut items = match state.emby.show_episodes_paged(series_id, LIST_FIELDS).await {
        Ok(v) => v,
        Err(e @ GatewayError::NotConfigured(_)) => return Err(e),
        Err(e) => {
            warn!("[VIDEOS] Show Episodes 拉取失败 series={series_id}: {e}");
            Vec::new()
        }
    };

    // 有些库/元数据会导致 Episodes 返回不全
    if items.len() <= 1 {
        match collect_by_seasons(state, series_id).await {
            Ok(v) if !v.is_empty() => items = v,
            Ok(_) => {}
            Err(e @ GatewayError::NotConfigured(_)) => return Err(e),
            Err(e) => warn!("[VIDEOS] 按季兜底失败 series={series_id}: {e}"),
        }
    }

    if items.len() <= 1 {
        let params = to_params(&[
            ("Recursive", "true"),
            ("Fields", LIST_FIELDS),
            ("IncludeItemTypes", "Episode,Video"),
            ("ParentId", series_id),
            ("SortBy", "SortName"),
            ("SortOrder", "Ascending"),
            ("Limit", FALLBACK_LIMIT),
        ]);
        items = unique_by_id(state.emby.items(&params).await?.items);
    }

    items.sort_by_key(episode_sort_key);
    Ok(items)
}

async fn collect_by_seasons(
    state: &AppState,
    series_id: &str,
) -> Result<Vec<EmbyItem>, GatewayError> {
    let seasons = match state.emby.show_seasons(series_id).await {
        Ok(p) => p.items,
        Err(e @ GatewayError::NotConfigured(_)) => return Err(e),
        Err(e) => {
            warn!("[VIDEOS] Seasons 拉取失败 series={series_id}: {e}");
            Vec::new()
        }
    };

    let seasons = if seasons.is_empty() {
        let params = to_params(&[
            ("Recursive", "true"),
            ("Fields", LIST_FIELDS),
            ("IncludeItemTypes", "Season"),
            ("ParentId", series_id),
            ("SortBy", "SortName"),
            ("SortOrder", "Ascending"),
            ("Limit", FALLBACK_LIMIT),
        ]);
        state.emby.items(&params).await?.items
    } else {
        seasons
    };

    let mut collected = Vec::new();
    for season in seasons {
        if season.id.is_empty() {
            continue;
        }
        let params = to_params(&[
            ("Recursive", "false"),
            ("Fields", LIST_FIELDS),
            ("IncludeItemTypes", "Episode,Video"),
            ("ParentId", season.id.as_str()),
            ("SortBy", "SortName"),
            ("SortOrder", "Ascending"),
            ("Limit", FALLBACK_LIMIT),
        ]);
        collected.extend(state.emby.items(&params).await?.items);
    }
    Ok(unique_by_id(collected))
}

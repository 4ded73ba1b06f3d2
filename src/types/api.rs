//! 对前端输出的 JSON 类型

use serde::Serialize;

/// 列表条目，artwork 一律走 /api/proxy/image 代理地址
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub poster_url: String,
    pub backdrop_url: String,
    pub logo_url: String,
    pub year: Option<i64>,
    pub air_days: Vec<String>,
    pub parent_index_number: Option<i64>,
    pub index_number: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoList {
    pub items: Vec<VideoSummary>,
}

/// 播放描述。详情/补充失败时降级为只含 url 与 type 的最小形式
#[derive(Debug, Clone, Serialize)]
pub struct PlayInfo {
    pub url: String,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_index_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_number: Option<i64>,
}

impl PlayInfo {
    /// 最小可播放描述：流地址仍然有效，其余字段缺省
    pub fn minimal(item_id: &str) -> Self {
        Self {
            url: format!("/api/proxy/stream/{item_id}"),
            item_type: Some("auto".into()),
            series_id: None,
            season_id: None,
            parent_id: None,
            backdrop_url: None,
            poster_url: None,
            logo_url: None,
            title: None,
            parent_index_number: None,
            index_number: None,
        }
    }
}

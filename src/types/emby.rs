//! Emby API 类型定义

use serde::{Deserialize, Serialize};

/// Emby 条目（电影/剧集/单集通用，字段按需取用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbyItem {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub item_type: Option<String>,
    #[serde(rename = "SortName", default)]
    pub sort_name: Option<String>,
    #[serde(rename = "ParentIndexNumber", default)]
    pub parent_index_number: Option<i64>,
    #[serde(rename = "IndexNumber", default)]
    pub index_number: Option<i64>,
    #[serde(rename = "ProductionYear", default)]
    pub production_year: Option<i64>,
    #[serde(rename = "AirDays", default)]
    pub air_days: Vec<String>,
    #[serde(rename = "DateCreated", default)]
    pub date_created: Option<String>,
    #[serde(rename = "PremiereDate", default)]
    pub premiere_date: Option<String>,
    #[serde(rename = "DateLastMediaAdded", default)]
    pub date_last_media_added: Option<String>,
    #[serde(rename = "DateLastContentAdded", default)]
    pub date_last_content_added: Option<String>,
    #[serde(rename = "SeriesId", default)]
    pub series_id: Option<String>,
    #[serde(rename = "SeasonId", default)]
    pub season_id: Option<String>,
    #[serde(rename = "ParentId", default)]
    pub parent_id: Option<String>,
}

/// Emby 列表响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbyItemsPage {
    #[serde(rename = "Items", default)]
    pub items: Vec<EmbyItem>,
    #[serde(rename = "TotalRecordCount", default)]
    pub total_record_count: Option<i64>,
}

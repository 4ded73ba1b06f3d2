//! TMDB API 类型定义

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSearchPage {
    #[serde(default)]
    pub results: Vec<TmdbSearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSearchResult {
    pub id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbImages {
    #[serde(default)]
    pub backdrops: Vec<TmdbImage>,
    #[serde(default)]
    pub logos: Vec<TmdbImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbImage {
    pub file_path: String,
}

//! 剧集季/集号推导与排序
//! 数字字段缺失时依次回退：SortName 的 SxxExx → 标题"第 N 集" → SortName 的 E<N>

use std::sync::LazyLock;

use regex::Regex;

use crate::types::emby::EmbyItem;

static SORT_SEASON_EP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d+)\s*E(\d+)").unwrap());
static TITLE_EP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*(\d+)\s*(?:集|话|話|回|章|卷|巻)").unwrap());
static EP_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(?:EP|E)\s*(\d+)").unwrap());

fn capture_int(re: &Regex, text: &str, group: usize) -> Option<i64> {
    re.captures(text)
        .and_then(|c| c.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

/// 推导季号和集号
pub fn extract_season_episode(item: &EmbyItem) -> (Option<i64>, Option<i64>) {
    let mut season = item.parent_index_number;
    let mut episode = item.index_number;

    let sort_name = item.sort_name.as_deref().unwrap_or("");
    if (season.is_none() || episode.is_none()) && !sort_name.is_empty() {
        if let Some(caps) = SORT_SEASON_EP_RE.captures(sort_name) {
            if season.is_none() {
                season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            }
            if episode.is_none() {
                episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
            }
        }
    }

    if episode.is_none() {
        let name = item.name.as_deref().unwrap_or("");
        for text in [name, sort_name] {
            if text.is_empty() {
                continue;
            }
            if let Some(ep) = capture_int(&TITLE_EP_RE, text, 1) {
                episode = Some(ep);
                break;
            }
        }
    }

    if episode.is_none() && !sort_name.is_empty() {
        episode = capture_int(&EP_ONLY_RE, sort_name, 1);
    }

    (season, episode)
}

/// 全序排序键：未知季排在已知季之后，再按季升序；集号同理；最后按名称、Id 稳定兜底
pub fn episode_sort_key(item: &EmbyItem) -> (u8, i64, u8, i64, String, String) {
    let (season, episode) = extract_season_episode(item);
    (
        if season.is_none() { 1 } else { 0 },
        season.unwrap_or(0),
        if episode.is_none() { 1 } else { 0 },
        episode.unwrap_or(0),
        item.sort_name
            .clone()
            .or_else(|| item.name.clone())
            .unwrap_or_default(),
        item.id.clone(),
    )
}

fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    let value = value?;
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// 首页排序时间戳。Series 取最近入库时间，其余取创建/首播时间；解析失败记 0
pub fn home_sort_timestamp(item: &EmbyItem) -> i64 {
    let ts = if item.item_type.as_deref() == Some("Series") {
        parse_timestamp(item.date_last_media_added.as_deref())
            .or_else(|| parse_timestamp(item.date_last_content_added.as_deref()))
            .or_else(|| parse_timestamp(item.date_created.as_deref()))
    } else {
        parse_timestamp(item.date_created.as_deref())
            .or_else(|| parse_timestamp(item.premiere_date.as_deref()))
    };
    ts.unwrap_or(0)
}

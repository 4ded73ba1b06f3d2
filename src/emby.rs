//! Emby HTTP 客户端
//! 出站请求才附加 api_key，客户端侧永远看不到凭据

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::types::emby::{EmbyItem, EmbyItemsPage};

/// 单页拉取条数
const EPISODE_PAGE_LIMIT: i64 = 200;
/// 分页保护上限，防止异常库无限翻页
const EPISODE_PAGE_GUARD: i64 = 5000;

#[derive(Clone)]
pub struct EmbyClient {
    base: String,
    api_key: Option<String>,
    user_id: Option<String>,
    http: Client,
}

impl EmbyClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base: config.emby_host.clone(),
            api_key: config.api_key.clone(),
            user_id: config.user_id.clone(),
            http,
        }
    }

    /// 共享的 reqwest 客户端，图片代理复用同一连接池
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// api_key（+ 可选 UserId）基础参数
    pub fn base_params(&self) -> Result<Vec<(String, String)>, GatewayError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured("EMBY_API_KEY"))?;
        let mut params = vec![("api_key".to_string(), key.to_string())];
        if let Some(ref uid) = self.user_id {
            params.push(("UserId".to_string(), uid.clone()));
        }
        Ok(params)
    }

    /// 对 /emby 下任意路径发 GET 并解析 JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let url = format!("{}/emby{}", self.base, path);
        debug!("[EMBY] GET {}", path);

        let resp = self.http.get(&url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamStatus(status.as_u16()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| GatewayError::MalformedUpstream(e.to_string()))
    }

    pub async fn item_detail(&self, item_id: &str) -> Result<EmbyItem, GatewayError> {
        let params = self.base_params()?;
        self.get_json(&format!("/Items/{item_id}"), &params).await
    }

    pub async fn items(&self, extra: &[(String, String)]) -> Result<EmbyItemsPage, GatewayError> {
        let mut params = self.base_params()?;
        params.extend_from_slice(extra);
        self.get_json("/Items", &params).await
    }

    /// 按 Show 分页拉全部 Episodes，按 Id 去重
    /// 翻页直到空页 / 无新条目 / 达到 TotalRecordCount / 超过保护上限
    pub async fn show_episodes_paged(
        &self,
        series_id: &str,
        fields: &str,
    ) -> Result<Vec<EmbyItem>, GatewayError> {
        let base = {
            let mut p = self.base_params()?;
            p.push(("SortBy".into(), "SortName".into()));
            p.push(("SortOrder".into(), "Ascending".into()));
            p.push(("Fields".into(), fields.to_string()));
            p
        };

        let mut collected: Vec<EmbyItem> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut start_index: i64 = 0;

        loop {
            let mut params = base.clone();
            params.push(("StartIndex".into(), start_index.to_string()));
            params.push(("Limit".into(), EPISODE_PAGE_LIMIT.to_string()));

            let page: EmbyItemsPage = self
                .get_json(&format!("/Shows/{series_id}/Episodes"), &params)
                .await?;
            if page.items.is_empty() {
                break;
            }

            let page_len = page.items.len() as i64;
            let mut new_count = 0;
            for raw in page.items {
                if raw.id.is_empty() || !seen.insert(raw.id.clone()) {
                    continue;
                }
                collected.push(raw);
                new_count += 1;
            }
            if new_count == 0 {
                break;
            }

            start_index += page_len;
            if let Some(total) = page.total_record_count {
                if collected.len() as i64 >= total {
                    break;
                }
            }
            if start_index > EPISODE_PAGE_GUARD {
                break;
            }
        }

        Ok(collected)
    }

    pub async fn show_seasons(&self, series_id: &str) -> Result<EmbyItemsPage, GatewayError> {
        let params = self.base_params()?;
        self.get_json(&format!("/Shows/{series_id}/Seasons"), &params)
            .await
    }
}

//! TMDB 预取服务
//! 同一 (名称, 类型) 同时只允许一个在途请求；后台队列 + 信号量限流，
//! 不阻塞触发它的列表/播放请求

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Client;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::services::tmdb_cache::{artwork_cache_key, ArtworkUrls, MetadataCacheStore};
use crate::types::tmdb::{TmdbImages, TmdbSearchPage};

pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// 同时向 TMDB 发起的抓取上限
const PREFETCH_PERMITS: usize = 3;
/// 预取队列容量，塞满后直接丢弃新任务
const PREFETCH_QUEUE: usize = 64;

struct PrefetchJob {
    key: String,
    name: String,
    kind: String,
}

pub struct TmdbService {
    inner: Arc<TmdbInner>,
    jobs: mpsc::Sender<PrefetchJob>,
    dispatcher: JoinHandle<()>,
}

struct TmdbInner {
    store: MetadataCacheStore,
    inflight: DashMap<String, ()>,
    permits: Arc<Semaphore>,
    http: Client,
    token: Option<String>,
    api_base: String,
}

/// 在途标记守卫，任务无论成功失败都要摘除标记
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, ()>,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.key);
    }
}

impl TmdbService {
    pub fn new(token: Option<String>, snapshot_path: Option<PathBuf>) -> Self {
        Self::with_base(token, snapshot_path, TMDB_API_BASE)
    }

    /// api_base 可替换，测试用桩服务计数上游调用
    pub fn with_base(
        token: Option<String>,
        snapshot_path: Option<PathBuf>,
        api_base: &str,
    ) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        let inner = Arc::new(TmdbInner {
            store: MetadataCacheStore::load(snapshot_path),
            inflight: DashMap::new(),
            permits: Arc::new(Semaphore::new(PREFETCH_PERMITS)),
            http,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        });

        let (tx, mut rx) = mpsc::channel::<PrefetchJob>(PREFETCH_QUEUE);
        let dispatcher = tokio::spawn({
            let inner = inner.clone();
            async move {
                while let Some(job) = rx.recv().await {
                    let permit = match inner.permits.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        inner.run_job(job).await;
                    });
                }
            }
        });

        Self {
            inner,
            jobs: tx,
            dispatcher,
        }
    }

    /// 只读缓存，永不触网
    pub fn cached(&self, name: &str, kind: &str) -> Option<ArtworkUrls> {
        self.inner.store.get(name, kind)
    }

    /// 触发后台预取，立即返回
    /// 无令牌、类型不支持、已缓存或已在途时为 no-op
    pub fn ensure_prefetch(&self, name: &str, kind: &str) {
        if self.inner.token.is_none() || !matches!(kind, "Series" | "Movie") {
            return;
        }
        if name.is_empty() || self.inner.store.contains(name, kind) {
            return;
        }

        let key = artwork_cache_key(name, kind);
        // 第一个插入者胜出，其余视为已在途
        if self.inner.inflight.insert(key.clone(), ()).is_some() {
            return;
        }

        let job = PrefetchJob {
            key: key.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        if self.jobs.try_send(job).is_err() {
            self.inner.inflight.remove(&key);
            warn!("[TMDB] 预取队列已满，丢弃 {key}");
        }
    }
}

impl Drop for TmdbService {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl TmdbInner {
    async fn run_job(&self, job: PrefetchJob) {
        let _guard = InflightGuard {
            inflight: &self.inflight,
            key: &job.key,
        };

        // 排队期间可能已被其他路径写入
        if self.store.contains(&job.name, &job.kind) {
            return;
        }

        if let Err(e) = self.fetch_and_store(&job.name, &job.kind).await {
            // 失败不写负缓存，下次请求会重试
            warn!("[TMDB] 抓取失败 name={} kind={}: {e}", job.name, job.kind);
        }
    }

    /// 搜索 → 取第一个结果 → 拉图片列表 → 取第一张背景/Logo → 写缓存
    /// 排序完全按 TMDB 返回顺序，不做本地重排
    async fn fetch_and_store(&self, name: &str, kind: &str) -> Result<(), GatewayError> {
        let Some(ref token) = self.token else {
            return Ok(());
        };
        let tmdb_type = if kind == "Series" { "tv" } else { "movie" };

        let search: TmdbSearchPage = self
            .http
            .get(format!("{}/search/{}", self.api_base, tmdb_type))
            .bearer_auth(token)
            .header("accept", "application/json")
            .query(&[("query", name), ("language", "zh-CN"), ("page", "1")])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::MalformedUpstream(e.to_string()))?;

        let Some(first) = search.results.first() else {
            debug!("[TMDB] 无搜索结果: {name}");
            return Ok(());
        };

        let images: TmdbImages = self
            .http
            .get(format!(
                "{}/{}/{}/images",
                self.api_base, tmdb_type, first.id
            ))
            .bearer_auth(token)
            .header("accept", "application/json")
            .query(&[("include_image_language", "zh,en,null")])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::MalformedUpstream(e.to_string()))?;

        let backdrop = images
            .backdrops
            .first()
            .map(|img| format!("{TMDB_IMAGE_BASE}/w1280{}", img.file_path));
        let logo = images
            .logos
            .first()
            .map(|img| format!("{TMDB_IMAGE_BASE}/w500{}", img.file_path));

        debug!(
            "[TMDB] 命中 name={name} backdrop={} logo={}",
            backdrop.is_some(),
            logo.is_some()
        );
        self.store.put(name, kind, ArtworkUrls { backdrop, logo });
        Ok(())
    }
}

//! 应用共享状态
//! 所有服务在启动时显式构造、按引用传入 handler，测试可以各自建独立实例

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::emby::EmbyClient;
use crate::services::image_cache::ImageBlobCache;
use crate::services::tmdb::TmdbService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub emby: EmbyClient,
    pub tmdb: Arc<TmdbService>,
    /// 磁盘缓存禁用时为 None，图片代理退化为直通
    pub image_cache: Option<Arc<ImageBlobCache>>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let emby = EmbyClient::new(&config);

        let snapshot = config
            .disk_cache_enabled
            .then(|| config.tmdb_cache_file());
        let tmdb = Arc::new(TmdbService::new(config.tmdb_token.clone(), snapshot));

        let image_cache = config.disk_cache_enabled.then(|| {
            Arc::new(ImageBlobCache::new(
                config.image_cache_dir(),
                config.image_cache_max_age_days,
            ))
        });

        Self {
            config: Arc::new(config),
            emby,
            tmdb,
            image_cache,
        }
    }
}

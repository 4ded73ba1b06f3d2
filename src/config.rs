//! emby-gate 配置模块
//! 支持环境变量和默认值

use std::path::PathBuf;

use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 网关监听地址
    pub host: String,
    /// 网关监听端口
    pub port: u16,
    /// Emby 服务器地址（末尾斜杠会被去掉）
    pub emby_host: String,
    /// Emby API Key，缺失时受保护接口返回配置错误
    pub api_key: Option<String>,
    /// Emby 用户 ID，可选
    pub user_id: Option<String>,
    /// TMDB 读访问令牌，缺失时跳过元数据补充
    pub tmdb_token: Option<String>,
    /// 播放鉴权 cookie 名
    pub auth_cookie_name: String,
    /// 播放鉴权 cookie 值
    pub auth_cookie_value: String,
    /// 是否启用磁盘缓存
    pub disk_cache_enabled: bool,
    /// 缓存根目录
    pub cache_dir: PathBuf,
    /// 图片缓存保留天数，0 表示不清理
    pub image_cache_max_age_days: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("GATEWAY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8800),
            emby_host: std::env::var("EMBY_HOST")
                .unwrap_or_else(|_| "https://tv.ydyd.me".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("EMBY_API_KEY").ok().filter(|v| !v.is_empty()),
            user_id: std::env::var("EMBY_USER_ID").ok().filter(|v| !v.is_empty()),
            tmdb_token: std::env::var("TMDB_READ_TOKEN").ok().filter(|v| !v.is_empty()),
            auth_cookie_name: std::env::var("AUTH_COOKIE_NAME")
                .unwrap_or_else(|_| "ydyd_auth".into()),
            auth_cookie_value: std::env::var("AUTH_COOKIE_VALUE").unwrap_or_else(|_| "1".into()),
            disk_cache_enabled: std::env::var("ENABLE_DISK_CACHE")
                .map(|v| v != "0")
                .unwrap_or(true),
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".cache")),
            image_cache_max_age_days: std::env::var("IMAGE_CACHE_MAX_AGE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// 受保护操作在发起任何上游请求前先检查 API Key
    pub fn require_api_key(&self) -> Result<&str, GatewayError> {
        self.api_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured("EMBY_API_KEY"))
    }

    /// TMDB 元数据缓存快照文件
    pub fn tmdb_cache_file(&self) -> PathBuf {
        self.cache_dir.join("tmdb_cache.json")
    }

    /// 图片缓存目录
    pub fn image_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }
}

//! 图片磁盘缓存
//! 按请求内容寻址：规范化路径 + 排序后的查询参数（不含凭据）做 sha256，
//! 同名 {hash}.json 旁车 + {hash}.bin 字节成对存取

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// 旁车元数据，承载条件请求所需的校验头
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMeta {
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct ImageBlobCache {
    dir: PathBuf,
}

impl ImageBlobCache {
    /// max_age_days > 0 时启动清理一次过期条目，0 保持只增不减
    pub fn new(dir: PathBuf, max_age_days: u64) -> Self {
        if max_age_days > 0 {
            sweep_stale(&dir, max_age_days);
        }
        Self { dir }
    }

    /// 键对参数名排序保证确定性；凭据参数由调用方事先剔除
    pub fn cache_key(clean_path: &str, params: &[(String, String)]) -> String {
        let mut pairs: Vec<&(String, String)> = params.iter().collect();
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let digest = Sha256::digest(format!("{clean_path}?{query}").as_bytes());
        hex::encode(digest)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn bytes_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    /// 两个文件必须同时存在才算命中，半对按未命中处理；读失败降级为未命中
    pub fn lookup(&self, key: &str) -> Option<(ImageMeta, Vec<u8>)> {
        let meta_path = self.meta_path(key);
        let bytes_path = self.bytes_path(key);
        if !meta_path.exists() || !bytes_path.exists() {
            return None;
        }

        let read = || -> std::io::Result<(ImageMeta, Vec<u8>)> {
            let meta: ImageMeta = serde_json::from_slice(&std::fs::read(&meta_path)?)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let bytes = std::fs::read(&bytes_path)?;
            Ok((meta, bytes))
        };
        match read() {
            Ok(hit) => Some(hit),
            Err(e) => {
                warn!("[IMAGE] 缓存读取失败，按未命中处理: {e}");
                None
            }
        }
    }

    /// 临时文件 + 原子改名，先落字节再落旁车，读侧不会把半截对当命中
    pub fn store(&self, key: &str, meta: &ImageMeta, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let bytes_path = self.bytes_path(key);
        let meta_path = self.meta_path(key);
        let tmp_bytes = self.dir.join(format!("{key}.bin.tmp"));
        let tmp_meta = self.dir.join(format!("{key}.json.tmp"));

        std::fs::write(&tmp_bytes, bytes)?;
        let raw_meta = serde_json::to_vec(meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp_meta, raw_meta)?;

        std::fs::rename(&tmp_bytes, &bytes_path)?;
        std::fs::rename(&tmp_meta, &meta_path)
    }
}

/// 启动清理：删除超过保留期的缓存文件
fn sweep_stale(dir: &PathBuf, max_age_days: u64) {
    let cutoff = Duration::from_secs(max_age_days * 24 * 3600);
    let now = SystemTime::now();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return, // 目录还不存在
    };

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| now.duration_since(t).ok())
            .map(|age| age > cutoff)
            .unwrap_or(false);
        if stale && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("[IMAGE] 清理过期缓存 {removed} 个文件");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_and_order_free() {
        let a = ImageBlobCache::cache_key(
            "/Items/1/Images/Primary",
            &[
                ("maxWidth".into(), "600".into()),
                ("quality".into(), "90".into()),
            ],
        );
        let b = ImageBlobCache::cache_key(
            "/Items/1/Images/Primary",
            &[
                ("quality".into(), "90".into()),
                ("maxWidth".into(), "600".into()),
            ],
        );
        assert_eq!(a, b);

        let c = ImageBlobCache::cache_key(
            "/Items/2/Images/Primary",
            &[("maxWidth".into(), "600".into())],
        );
        assert_ne!(a, c);
    }

    #[test]
    fn store_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageBlobCache::new(dir.path().to_path_buf(), 0);

        let meta = ImageMeta {
            content_type: Some("image/jpeg".into()),
            etag: Some("\"abc\"".into()),
            last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
        };
        cache.store("k1", &meta, b"jpegbytes").unwrap();

        let (got_meta, got_bytes) = cache.lookup("k1").unwrap();
        assert_eq!(got_meta.etag.as_deref(), Some("\"abc\""));
        assert_eq!(got_bytes, b"jpegbytes");
    }

    #[test]
    fn lone_sidecar_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageBlobCache::new(dir.path().to_path_buf(), 0);

        std::fs::write(dir.path().join("k2.json"), br#"{"etag":"x"}"#).unwrap();
        assert!(cache.lookup("k2").is_none());
    }

    #[test]
    fn sweep_removes_old_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let old_meta = dir.path().join("old.json");
        let old_bytes = dir.path().join("old.bin");
        std::fs::write(&old_meta, b"{}").unwrap();
        std::fs::write(&old_bytes, b"x").unwrap();
        let past = SystemTime::now() - Duration::from_secs(90 * 24 * 3600);
        for p in [&old_meta, &old_bytes] {
            let f = std::fs::File::options().write(true).open(p).unwrap();
            f.set_modified(past).unwrap();
        }

        let _cache = ImageBlobCache::new(dir.path().to_path_buf(), 30);
        assert!(!old_meta.exists());
        assert!(!old_bytes.exists());
    }
}

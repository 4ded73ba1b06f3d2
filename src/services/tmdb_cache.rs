//! TMDB 元数据缓存
//! 内存 map + 整表 JSON 快照。条目一旦写入即视为权威结果，进程内不再重取

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 解析出的图片地址，两项都可能为空
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtworkUrls {
    pub backdrop: Option<String>,
    pub logo: Option<String>,
}

/// 缓存键：名称 + Emby 类型
pub fn artwork_cache_key(name: &str, kind: &str) -> String {
    format!("{name}_{kind}")
}

pub struct MetadataCacheStore {
    entries: DashMap<String, ArtworkUrls>,
    /// None 表示纯内存模式（磁盘缓存被禁用）
    snapshot_path: Option<PathBuf>,
}

impl MetadataCacheStore {
    /// 启动时加载一次快照。快照缺失、损坏或不可读都按空缓存处理
    pub fn load(snapshot_path: Option<PathBuf>) -> Self {
        let entries = DashMap::new();
        if let Some(ref path) = snapshot_path {
            match Self::read_snapshot(path) {
                Ok(Some(map)) => {
                    debug!("[TMDB] 快照加载 {} 条", map.len());
                    for (k, v) in map {
                        entries.insert(k, v);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("[TMDB] 快照加载失败，按空缓存继续: {e}"),
            }
        }
        Self {
            entries,
            snapshot_path,
        }
    }

    fn read_snapshot(path: &Path) -> std::io::Result<Option<HashMap<String, ArtworkUrls>>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(path)?;
        match serde_json::from_slice(&raw) {
            Ok(map) => Ok(Some(map)),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        }
    }

    /// 只读内存，永不触网；未命中返回 None
    pub fn get(&self, name: &str, kind: &str) -> Option<ArtworkUrls> {
        self.entries
            .get(&artwork_cache_key(name, kind))
            .map(|v| v.value().clone())
    }

    pub fn contains(&self, name: &str, kind: &str) -> bool {
        self.entries.contains_key(&artwork_cache_key(name, kind))
    }

    /// 内存 upsert 后尽力写快照；快照失败只记日志，内存缓存照常可用
    pub fn put(&self, name: &str, kind: &str, urls: ArtworkUrls) {
        self.entries.insert(artwork_cache_key(name, kind), urls);
        if let Err(e) = self.save_snapshot() {
            warn!("[TMDB] 快照保存失败: {e}");
        }
    }

    /// 整表覆盖写，临时文件 + 原子改名，避免读到半截文件
    fn save_snapshot(&self) -> std::io::Result<()> {
        let Some(ref path) = self.snapshot_path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let map: HashMap<String, ArtworkUrls> = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let raw = serde_json::to_vec(&map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, path)
    }
}

//! 楽曲カタログのロード
//!
//! - `songs.json`：`CatalogueEntry` の配列
//! - `aliases.json`：`{aliases: [{song_id, aliases}]}`
//! - 別名APIのURLがあれば先に取得し、失敗したらローカルの別名ファイルを使う

use reqwest::Client;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

use super::types::{AliasList, CatalogueEntry};
use crate::config::http_timeout;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("Failed to read catalogue file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalogue: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to fetch alias list: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Alias list request returned status {0}")]
    FetchStatus(u16),

    #[error("Catalogue has no songs")]
    Empty,
}

/// 読み取り専用の楽曲カタログ（ID昇順）
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: Vec<CatalogueEntry>,
}

impl Catalogue {
    /// 楽曲と別名をまとめる
    ///
    /// タイトルは常に別名の先頭に入る。存在しない曲IDの別名は捨てる。
    /// 曲IDが重複した場合は後のものを使う。
    pub fn new(songs: Vec<CatalogueEntry>, aliases: AliasList) -> Self {
        let mut by_id: BTreeMap<i64, CatalogueEntry> = BTreeMap::new();
        for mut song in songs {
            song.aliases = vec![song.title.clone()];
            if let Some(previous) = by_id.insert(song.id, song) {
                log::warn!("Duplicate song id {} in catalogue", previous.id);
            }
        }

        let mut ignored = 0usize;
        for record in aliases.aliases {
            let Some(entry) = by_id.get_mut(&record.song_id) else {
                ignored += 1;
                continue;
            };
            for alias in record.aliases {
                let alias = alias.trim();
                if !alias.is_empty() && !entry.aliases.iter().any(|a| a == alias) {
                    entry.aliases.push(alias.to_string());
                }
            }
        }
        if ignored > 0 {
            log::debug!("Ignored aliases for {} unknown songs", ignored);
        }

        Self {
            entries: by_id.into_values().collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn get(&self, id: i64) -> Option<&CatalogueEntry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// カタログのロード元
pub trait CatalogueLoader: Send + Sync {
    fn load_all(&self) -> impl Future<Output = Result<Catalogue, CatalogueError>> + Send;
}

/// JSONファイル（＋任意の別名API）からロードする
pub struct JsonCatalogueLoader {
    client: Client,
    songs_path: PathBuf,
    aliases_path: Option<PathBuf>,
    alias_list_url: Option<String>,
}

impl JsonCatalogueLoader {
    pub fn new(songs_path: impl Into<PathBuf>) -> Result<Self, CatalogueError> {
        let client = Client::builder().timeout(http_timeout()).build()?;
        Ok(Self {
            client,
            songs_path: songs_path.into(),
            aliases_path: None,
            alias_list_url: None,
        })
    }

    pub fn with_aliases(mut self, path: impl Into<PathBuf>) -> Self {
        self.aliases_path = Some(path.into());
        self
    }

    pub fn with_alias_list_url(mut self, url: impl Into<String>) -> Self {
        self.alias_list_url = Some(url.into());
        self
    }

    async fn collect_aliases(&self) -> Result<AliasList, CatalogueError> {
        if let Some(url) = &self.alias_list_url {
            match self.fetch_alias_list(url).await {
                Ok(list) => {
                    log::info!("Fetched {} alias records from {}", list.aliases.len(), url);
                    return Ok(list);
                }
                Err(e) => log::warn!("Failed to fetch alias list, using local file: {}", e),
            }
        }

        match &self.aliases_path {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await?;
                Ok(serde_json::from_str(&content)?)
            }
            None => Ok(AliasList::default()),
        }
    }

    async fn fetch_alias_list(&self, url: &str) -> Result<AliasList, CatalogueError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogueError::FetchStatus(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

impl CatalogueLoader for JsonCatalogueLoader {
    async fn load_all(&self) -> Result<Catalogue, CatalogueError> {
        let content = tokio::fs::read_to_string(&self.songs_path).await?;
        let songs: Vec<CatalogueEntry> = serde_json::from_str(&content)?;
        if songs.is_empty() {
            return Err(CatalogueError::Empty);
        }

        let aliases = self.collect_aliases().await?;
        let catalogue = Catalogue::new(songs, aliases);
        log::info!(
            "Catalogue loaded: {} songs from {}",
            catalogue.len(),
            self.songs_path.display()
        );
        Ok(catalogue)
    }
}

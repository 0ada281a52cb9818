// =============================================================================
// 共通設定・定数モジュール
// =============================================================================
// アプリケーション全体で使用する定数と、起動時に読み込む設定を定義
// 設定は <runtime_dir>/metadata.json → 環境変数 の順に適用する
// =============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// アプリケーションID（ランタイムディレクトリ名）
pub const APP_IDENTIFIER: &str = "com.plusplus7.wolfy";

/// HTTPリクエストのデフォルトタイムアウト（秒）
///
/// 開放プラットフォームAPI、署名サービス、別名APIへのリクエストで使用。
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// 弾幕接続のハートビート間隔（秒）
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// 開放プラットフォームのアプリ維持間隔（秒）
pub const KEEPALIVE_INTERVAL_SECS: u64 = 20;

/// 受信フレームキューの容量
pub const INBOUND_QUEUE_CAPACITY: usize = 1024;

/// 点歌キューの既定サイズ
pub const DEFAULT_QUEUE_SIZE: usize = 12;

/// 既定の主播名
pub const DEFAULT_SUPER_ADMIN: &str = "主播";

/// 署名サービスの既定アドレス
pub const DEFAULT_SIGNATORY_ADDR: &str = "http://127.0.0.1:8090";

const METADATA_FILE: &str = "metadata.json";

/// HTTPリクエストのデフォルトタイムアウト（Duration）
///
/// HTTPクライアント構築時に直接使用可能
pub fn http_timeout() -> Duration {
    Duration::from_secs(HTTP_TIMEOUT_SECS)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Data directory is not available on this platform")]
    NoDataDir,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// 起動設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
    /// 主播の身分コード
    pub anchor_code: String,
    pub app_id: i64,
    pub signatory_addr: String,
    /// 別名API（lxns形式）。無ければローカルの aliases.json のみ
    pub alias_list_url: Option<String>,
    pub max_queue_size: usize,
    /// 1人あたりの点歌上限
    pub quota: Option<usize>,
    pub super_admin: String,
    #[serde(skip)]
    pub runtime_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            anchor_code: String::new(),
            app_id: 0,
            signatory_addr: DEFAULT_SIGNATORY_ADDR.to_string(),
            alias_list_url: None,
            max_queue_size: DEFAULT_QUEUE_SIZE,
            quota: None,
            super_admin: DEFAULT_SUPER_ADMIN.to_string(),
            runtime_dir: PathBuf::new(),
        }
    }
}

impl AppConfig {
    /// 環境変数とランタイムディレクトリから設定を読み込む
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let runtime_dir = match lookup("WOLFY_RUNTIME_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_runtime_dir()?,
        };

        let mut config = Self::load_from(&runtime_dir)?;
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// `<dir>/metadata.json` を読む。無ければ既定値
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(METADATA_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Self>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No {} found, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.runtime_dir = dir.to_path_buf();
        Ok(config)
    }

    /// 環境変数で上書きする
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(code) = lookup("WOLFY_ANCHOR_CODE") {
            self.anchor_code = code;
        }
        if let Some(value) = lookup("WOLFY_APP_ID") {
            self.app_id = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "WOLFY_APP_ID",
                value,
            })?;
        }
        if let Some(addr) = lookup("WOLFY_SIGNATORY_ADDR") {
            self.signatory_addr = addr;
        }
        if let Some(dir) = lookup("WOLFY_RUNTIME_DIR") {
            self.runtime_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anchor_code.trim().is_empty() {
            return Err(ConfigError::Missing("anchor_code"));
        }
        if self.app_id <= 0 {
            return Err(ConfigError::Missing("app_id"));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_queue_size",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn songs_path(&self) -> PathBuf {
        self.runtime_dir.join("songs.json")
    }

    pub fn aliases_path(&self) -> PathBuf {
        self.runtime_dir.join("aliases.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.runtime_dir.join("tickets.checkpoint.json")
    }
}

/// 既定のランタイムディレクトリ（`<data_dir>/<APP_IDENTIFIER>`）
pub fn default_runtime_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_IDENTIFIER))
        .ok_or(ConfigError::NoDataDir)
}

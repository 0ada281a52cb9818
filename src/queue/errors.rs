use thiserror::Error;

use crate::maimai::MatchError;

/// チェックポイントの読み書きエラー
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// キュー操作のエラー
///
/// 表示文言は配信画面にそのまま出る。
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("歌单已满~")]
    QueueFull,

    #[error("点歌数已达上限")]
    QuotaExceeded,

    #[error("编号错误")]
    BadIndex,

    #[error("只能操作自己点的歌曲")]
    PermissionDenied,

    #[error("没有找到匹配的歌曲: {0}")]
    NoMatch(#[from] MatchError),

    #[error("保存失败: {0}")]
    Persistence(#[from] StoreError),
}

impl From<QueueError> for String {
    fn from(err: QueueError) -> String {
        err.to_string()
    }
}

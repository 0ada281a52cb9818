use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Websocket transport failed: {0}")]
    TransportFailure(#[from] tungstenite::Error),

    #[error("Websocket closed by remote")]
    TransportClosed,

    #[error("Authentication rejected with code {0}")]
    AuthRejected(i64),

    #[error("Malformed auth reply: {0}")]
    MalformedAuthReply(String),

    #[error("Open platform API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Request signing failed: {0}")]
    SignError(String),

    #[error("No websocket link in start response")]
    MissingWebsocketLink,

    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Connection task aborted: {0}")]
    TaskAborted(String),
}

impl LiveError {
    /// 認証段階の失敗（接続は終了し、セッション側でリトライする）
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, LiveError::AuthRejected(_) | LiveError::MalformedAuthReply(_))
    }
}

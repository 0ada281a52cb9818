//! 開放プラットフォームのセッション
//!
//! 1セッションの流れ：
//! 1. `start_app` で場次IDと長連接情報を取得
//! 2. アプリ心跳タスクを起動
//! 3. 最初の wss リンクに接続し、長連接を実行
//! 4. 終了時（キャンセル・致命的エラー）に心跳を止め、`end_app` を1回だけ試みる
//!
//! 認証の失敗（拒否・応答の破損）のみ、バックオフを挟んで最大 `MAX_AUTH_ATTEMPTS` 回まで再接続する。
//! 通信エラーは再接続せず呼び出し元へ返す。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::backoff::{ExponentialBackoff, MAX_AUTH_ATTEMPTS};
use super::client::OpenPlatformClient;
use super::connection::{ConnectionConfig, LiveConnection};
use super::errors::LiveError;
use super::keepalive::AppKeepalive;
use super::signatory::Signatory;
use super::types::WebsocketInfo;
use crate::command::Command;
use crate::config::KEEPALIVE_INTERVAL_SECS;
use crate::util::mask_secret;

/// セッション設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 主播身份码
    pub anchor_code: String,
    pub app_id: i64,
    /// アプリ心跳の間隔
    pub keepalive_interval: Duration,
    /// 認証リトライの初回待機時間
    pub auth_retry_delay: Duration,
    pub connection: ConnectionConfig,
}

impl SessionConfig {
    pub fn new(anchor_code: impl Into<String>, app_id: i64) -> Self {
        Self {
            anchor_code: anchor_code.into(),
            app_id,
            keepalive_interval: Duration::from_secs(KEEPALIVE_INTERVAL_SECS),
            auth_retry_delay: Duration::from_secs(1),
            connection: ConnectionConfig::default(),
        }
    }
}

pub struct LiveSession<S> {
    client: Arc<OpenPlatformClient<S>>,
    config: SessionConfig,
    commands: mpsc::Sender<Command>,
}

impl<S: Signatory + 'static> LiveSession<S> {
    pub fn new(
        client: OpenPlatformClient<S>,
        config: SessionConfig,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            config,
            commands,
        }
    }

    /// セッションを最後まで実行する
    ///
    /// キャンセルで終わった場合は `Ok(())`。
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), LiveError> {
        log::info!(
            "Starting live session (anchor: {}, app: {})",
            mask_secret(&self.config.anchor_code),
            self.config.app_id
        );

        let started = self
            .client
            .start_app(&self.config.anchor_code, self.config.app_id)
            .await?;
        let game_id = started.game_info.game_id.clone();

        let keepalive = AppKeepalive::start(
            Arc::clone(&self.client),
            game_id.clone(),
            self.config.keepalive_interval,
            cancel,
        );

        let result = self.connect_with_retry(&started.websocket_info, cancel).await;

        keepalive.stop().await;
        if let Err(e) = self.client.end_app(&game_id, self.config.app_id).await {
            log::warn!("Failed to end app (game_id: {}): {}", game_id, e);
        }

        match &result {
            Ok(()) => log::info!("Live session finished"),
            Err(e) => log::error!("Live session failed: {}", e),
        }
        result
    }

    async fn connect_with_retry(
        &self,
        info: &WebsocketInfo,
        cancel: &CancellationToken,
    ) -> Result<(), LiveError> {
        let url = info
            .wss_link
            .first()
            .ok_or(LiveError::MissingWebsocketLink)?;
        log::debug!("Auth body: {}", mask_secret(&info.auth_body));

        let mut backoff = ExponentialBackoff::with_config(
            self.config.auth_retry_delay,
            Duration::from_secs(30),
            MAX_AUTH_ATTEMPTS,
        )
        .jittered();

        loop {
            let connection =
                LiveConnection::new(self.commands.clone(), self.config.connection.clone());

            match connection.open(url, &info.auth_body, cancel).await {
                Err(e) if e.is_auth_failure() && backoff.should_retry() => {
                    let delay = backoff.next_delay();
                    log::warn!(
                        "{}, reconnecting in {:?} (attempt {}/{})",
                        e,
                        delay,
                        backoff.attempt_count(),
                        MAX_AUTH_ATTEMPTS
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

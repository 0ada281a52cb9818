// =============================================================================
// アプリ心跳モジュール
// =============================================================================
// 開放プラットフォームの場次を維持するため、一定間隔で app heartbeat を送る
// =============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::OpenPlatformClient;
use super::signatory::Signatory;

/// アプリ心跳タスク
///
/// セッション開始時に起動し、`stop()` かルートのキャンセルで終了する。
/// 心跳の失敗はログに残すだけで、タスクは止めない。
pub struct AppKeepalive {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AppKeepalive {
    /// 心跳タスクを開始する
    ///
    /// # Arguments
    /// * `client` - 開放プラットフォームクライアント
    /// * `game_id` - 維持する場次ID
    /// * `interval` - 送信間隔
    /// * `parent` - 親のキャンセルトークン
    pub fn start<S>(
        client: Arc<OpenPlatformClient<S>>,
        game_id: String,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self
    where
        S: Signatory + 'static,
    {
        let cancel = parent.child_token();
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            Self::heartbeat_loop(client, game_id, interval, loop_cancel).await;
        });

        log::info!("App keepalive started (interval: {}s)", interval.as_secs());

        Self { cancel, handle }
    }

    async fn heartbeat_loop<S: Signatory>(
        client: Arc<OpenPlatformClient<S>>,
        game_id: String,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = client.app_heartbeat(&game_id).await {
                log::warn!("App heartbeat failed: {}", e);
            }
        }

        log::info!("App keepalive stopped");
    }

    /// 心跳を止め、タスクの終了を待つ
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::warn!("App keepalive task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bilibili::errors::LiveError;
    use crate::bilibili::types::SignedHeaders;

    struct NoopSignatory;

    impl Signatory for NoopSignatory {
        async fn sign(&self, _body: &str) -> Result<SignedHeaders, LiveError> {
            Ok(SignedHeaders::default())
        }
    }

    #[tokio::test]
    async fn test_keepalive_sends_until_stopped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/app/heartbeat")
            .with_status(200)
            .with_body(r#"{"code":0,"message":"ok","request_id":"r"}"#)
            .expect_at_least(2)
            .create_async()
            .await;

        let client = Arc::new(OpenPlatformClient::with_host(server.url(), NoopSignatory).unwrap());
        let root = CancellationToken::new();
        let keepalive =
            AppKeepalive::start(client, "g-1".to_string(), Duration::from_millis(30), &root);

        tokio::time::sleep(Duration::from_millis(200)).await;
        keepalive.stop().await;

        mock.assert_async().await;
        // 子トークンの停止は親に波及しない
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_keepalive_survives_failures_and_root_cancel() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/app/heartbeat")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = Arc::new(OpenPlatformClient::with_host(server.url(), NoopSignatory).unwrap());
        let root = CancellationToken::new();
        let keepalive =
            AppKeepalive::start(client, "g-1".to_string(), Duration::from_millis(20), &root);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!keepalive.handle.is_finished());

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), keepalive.stop())
            .await
            .unwrap();
    }
}

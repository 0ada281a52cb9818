use reqwest::Client;
use serde::Serialize;

use super::errors::LiveError;
use super::signatory::Signatory;
use super::types::*;
use crate::config::http_timeout;

/// 開放プラットフォーム（本番環境）
pub const OPEN_PLATFORM_HOST: &str = "https://live-open.biliapi.com";

/// 開放プラットフォームのアプリAPIクライアント
///
/// 全リクエストはJSONボディを署名者に署名させてからPOSTする。
pub struct OpenPlatformClient<S> {
    client: Client,
    host: String,
    signatory: S,
}

impl<S: Signatory> OpenPlatformClient<S> {
    pub fn new(signatory: S) -> Result<Self, LiveError> {
        Self::with_host(OPEN_PLATFORM_HOST, signatory)
    }

    /// 接続先ホストを指定して作成（テスト用）
    pub fn with_host(host: impl Into<String>, signatory: S) -> Result<Self, LiveError> {
        let client = Client::builder().timeout(http_timeout()).build()?;
        Ok(Self {
            client,
            host: host.into(),
            signatory,
        })
    }

    /// アプリを開始し、場次IDと長連接情報を取得
    ///
    /// 成功した時点で場次は開始済み。長連接リンクの有無は呼び出し側で確認する。
    pub async fn start_app(&self, code: &str, app_id: i64) -> Result<StartAppData, LiveError> {
        log::info!("Starting open platform app {}", app_id);

        let resp = self
            .post("/v2/app/start", &StartAppRequest { code, app_id })
            .await?;
        let data: StartAppData = serde_json::from_value(resp.data)?;

        log::info!(
            "Open platform app started (game_id: {}, room: {}, links: {})",
            data.game_info.game_id,
            data.anchor_info.room_id,
            data.websocket_info.wss_link.len()
        );
        Ok(data)
    }

    /// アプリ心跳（場次を維持する）
    pub async fn app_heartbeat(&self, game_id: &str) -> Result<(), LiveError> {
        self.post("/v2/app/heartbeat", &AppHeartbeatRequest { game_id })
            .await?;
        log::debug!("App heartbeat sent (game_id: {})", game_id);
        Ok(())
    }

    /// アプリを終了する
    pub async fn end_app(&self, game_id: &str, app_id: i64) -> Result<(), LiveError> {
        self.post("/v2/app/end", &EndAppRequest { game_id, app_id })
            .await?;
        log::info!("Open platform app ended (game_id: {})", game_id);
        Ok(())
    }

    async fn post<T: Serialize>(&self, path: &str, request: &T) -> Result<BaseResp, LiveError> {
        let body = serde_json::to_string(request)?;
        let headers = self.signatory.sign(&body).await?;

        let url = format!("{}{}", self.host, path);
        let mut builder = self.client.post(&url);
        for (name, value) in headers.pairs() {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;
        let status = response.status();
        let resp: BaseResp = response.json().await?;

        if resp.code != 0 {
            log::warn!(
                "Open platform {} failed: status {}, code {}, message {} (request_id: {})",
                path,
                status,
                resp.code,
                resp.message,
                resp.request_id
            );
            return Err(LiveError::Api {
                code: resp.code,
                message: resp.message,
            });
        }
        Ok(resp)
    }
}

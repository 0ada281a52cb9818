use reqwest::Client;
use std::future::Future;

use super::errors::LiveError;
use super::types::{RemoteSignRequest, RemoteSignResponse, SignedHeaders};
use crate::config::http_timeout;
use crate::util::mask_secret;

/// 開放プラットフォームAPIリクエストの署名者
///
/// 署名計算そのものはこのクレートの外にある。
pub trait Signatory: Send + Sync {
    /// リクエストボディ（JSON文字列）に対する署名済みヘッダを返す
    fn sign(&self, body: &str) -> impl Future<Output = Result<SignedHeaders, LiveError>> + Send;
}

/// 外部の署名サーバーに署名を依頼する
///
/// `POST <addr>/sign` に `{req_json, anchor_code}` を送り、
/// `{signed: {...}}` を受け取る。
pub struct RemoteSignatory {
    client: Client,
    addr: String,
    anchor_code: String,
}

impl RemoteSignatory {
    pub fn new(addr: impl Into<String>, anchor_code: impl Into<String>) -> Result<Self, LiveError> {
        let client = Client::builder().timeout(http_timeout()).build()?;
        let addr = addr.into();
        let anchor_code = anchor_code.into();
        log::info!(
            "Using remote signatory at {} (anchor: {})",
            addr,
            mask_secret(&anchor_code)
        );
        Ok(Self {
            client,
            addr,
            anchor_code,
        })
    }
}

impl Signatory for RemoteSignatory {
    async fn sign(&self, body: &str) -> Result<SignedHeaders, LiveError> {
        let url = format!("{}/sign", self.addr.trim_end_matches('/'));
        let request = RemoteSignRequest {
            req_json: body,
            anchor_code: &self.anchor_code,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LiveError::SignError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Remote signatory returned status {}", status);
            return Err(LiveError::SignError(format!(
                "signatory returned status {}",
                status
            )));
        }

        let signed: RemoteSignResponse = response
            .json()
            .await
            .map_err(|e| LiveError::SignError(e.to_string()))?;
        Ok(signed.signed)
    }
}

use serde::{Deserialize, Serialize};

/// 開放プラットフォームの弾幕イベントcmd
pub const DANMU_CMD: &str = "LIVE_OPEN_PLATFORM_DM";

/// 認証応答（op 8）のボディ
#[derive(Debug, Deserialize)]
pub struct AuthReply {
    #[serde(default)]
    pub code: i64,
}

/// チャットペイロード（op 5）の1イベント
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    pub cmd: String,
    #[serde(default)]
    pub data: DanmuData,
}

impl ChatEvent {
    pub fn is_danmu(&self) -> bool {
        self.cmd == DANMU_CMD
    }
}

/// 弾幕イベントの本体（必要なフィールドのみ）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DanmuData {
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub open_id: String,
    #[serde(default)]
    pub room_id: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub msg_id: String,
}

// 開放プラットフォーム API リクエスト/レスポンス型

#[derive(Debug, Serialize)]
pub struct StartAppRequest<'a> {
    /// 主播身份码
    pub code: &'a str,
    pub app_id: i64,
}

#[derive(Debug, Serialize)]
pub struct AppHeartbeatRequest<'a> {
    pub game_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EndAppRequest<'a> {
    pub game_id: &'a str,
    pub app_id: i64,
}

/// API共通レスポンス
#[derive(Debug, Deserialize)]
pub struct BaseResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// アプリ開始レスポンス
///
/// 場次IDだけが必須。長連接情報が欠けていても場次は開始済みなので、
/// 呼び出し側が終了処理をできるように受け入れる。
#[derive(Debug, Clone, Deserialize)]
pub struct StartAppData {
    pub game_info: GameInfo,
    #[serde(default)]
    pub websocket_info: WebsocketInfo,
    #[serde(default)]
    pub anchor_info: AnchorInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameInfo {
    pub game_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebsocketInfo {
    /// 長連接の認証ボディ（中身は不透明、そのまま送る）
    #[serde(default)]
    pub auth_body: String,
    #[serde(default)]
    pub wss_link: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnchorInfo {
    #[serde(default)]
    pub room_id: i64,
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub open_id: String,
}

/// 署名済みリクエストヘッダ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHeaders {
    pub content_type: String,
    pub content_accept_type: String,
    pub timestamp: String,
    pub signature_method: String,
    pub signature_version: String,
    pub authorization: String,
    pub nonce: String,
    pub access_key_id: String,
    pub content_md5: String,
}

impl SignedHeaders {
    /// HTTPヘッダ名と値の組
    pub fn pairs(&self) -> [(&'static str, &str); 9] {
        [
            ("x-bili-timestamp", self.timestamp.as_str()),
            ("x-bili-signature-method", self.signature_method.as_str()),
            ("x-bili-signature-nonce", self.nonce.as_str()),
            ("x-bili-accesskeyid", self.access_key_id.as_str()),
            ("x-bili-signature-version", self.signature_version.as_str()),
            ("x-bili-content-md5", self.content_md5.as_str()),
            ("Authorization", self.authorization.as_str()),
            ("Content-Type", self.content_type.as_str()),
            ("Accept", self.content_accept_type.as_str()),
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct RemoteSignRequest<'a> {
    pub req_json: &'a str,
    pub anchor_code: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSignResponse {
    pub signed: SignedHeaders,
}

// =============================================================================
// bilibili 直播開放プラットフォーム連携モジュール
// =============================================================================
// 開放プラットフォームのアプリAPIと弾幕長連接を扱う
//
// 機能:
// - 長連接のバイナリフレームのエンコード/デコード
// - 認証・ハートビート・受信フレームの振り分け
// - 弾幕テキストから点歌コマンドへの変換
// - アプリの開始・心跳・終了
// =============================================================================

pub mod backoff;
pub mod client;
pub mod codec;
pub mod connection;
pub mod danmu;
pub mod errors;
pub mod keepalive;
pub mod session;
pub mod signatory;
pub mod state;
pub mod types;

pub use client::OpenPlatformClient;
pub use codec::{Frame, FrameError, Operation};
pub use connection::{ConnectionConfig, LiveConnection};
pub use danmu::parse_danmu;
pub use errors::LiveError;
pub use session::{LiveSession, SessionConfig};
pub use signatory::{RemoteSignatory, Signatory};
pub use state::{ConnectionPhase, ConnectionState};

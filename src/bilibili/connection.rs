//! 弾幕長連接
//!
//! 1接続につき2つのループで動く：
//! 1. リーダー：WebSocketからバイナリを読み、フレームに分解して受信キューへ
//! 2. ディスパッチャ：受信キュー・ハートビートタイマー・キャンセルを待ち、
//!    オペコードごとに処理する
//!
//! 両ループは有界の受信キューだけで繋がる。キューが満杯のときリーダーは待つ。
//! 自動再接続はしない（認証リトライは `session` 側の責務）。

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::codec::{self, Frame, Operation};
use super::danmu::parse_danmu;
use super::errors::LiveError;
use super::state::{ConnectionPhase, ConnectionState};
use super::types::{AuthReply, ChatEvent};
use crate::command::Command;
use crate::config::{HEARTBEAT_INTERVAL_SECS, INBOUND_QUEUE_CAPACITY};

/// 接続ごとの設定
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 認証後のハートビート間隔
    pub heartbeat_interval: Duration,
    /// 受信キューの容量
    pub inbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            inbound_capacity: INBOUND_QUEUE_CAPACITY,
        }
    }
}

/// 1セッション分の長連接
///
/// 解析済みのコマンドは `commands` チャネルへ流す。
pub struct LiveConnection {
    state: Arc<ConnectionState>,
    commands: mpsc::Sender<Command>,
    config: ConnectionConfig,
}

impl LiveConnection {
    pub fn new(commands: mpsc::Sender<Command>, config: ConnectionConfig) -> Self {
        Self {
            state: Arc::new(ConnectionState::new()),
            commands,
            config,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// URLへ接続して `run` する
    pub async fn open(
        &self,
        url: &str,
        auth_body: &str,
        cancel: &CancellationToken,
    ) -> Result<(), LiveError> {
        log::info!("Connecting to live websocket {}", url);
        let (ws, _) = connect_async(url).await?;
        self.run(ws, auth_body, cancel).await
    }

    /// 接続済みのトランスポートでセッションを実行
    ///
    /// 戻るのは以下のいずれか：
    /// - キャンセル → `Ok(())`
    /// - 認証拒否・認証応答の破損 → `Err(AuthRejected | MalformedAuthReply)`
    /// - 読み書きの失敗・切断 → `Err(TransportFailure | TransportClosed)`
    ///
    /// どの場合も両ループを止め、トランスポートを閉じてから戻る。
    pub async fn run<S>(
        &self,
        mut ws: S,
        auth_body: &str,
        cancel: &CancellationToken,
    ) -> Result<(), LiveError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin
            + Send
            + 'static,
    {
        let auth = codec::encode(
            Operation::Auth,
            self.state.next_sequence(),
            auth_body.as_bytes(),
        );
        ws.send(Message::Binary(auth)).await?;
        self.state.advance(ConnectionPhase::Authenticating);
        log::debug!("Auth frame sent");

        let (mut sink, stream) = ws.split();
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(self.config.inbound_capacity.max(1));
        let token = cancel.child_token();

        let reader = tokio::spawn(read_loop(stream, frame_tx, token.clone()));
        let dispatched = self.dispatch_loop(&mut sink, frame_rx, &token).await;

        // どちらが先に終わっても両方止める
        token.cancel();
        let read = match reader.await {
            Ok(result) => result,
            Err(e) => Err(LiveError::TaskAborted(e.to_string())),
        };

        self.state.advance(ConnectionPhase::Closed);
        if let Err(e) = sink.close().await {
            log::debug!("Failed to close live websocket: {}", e);
        }
        log::info!("Live connection closed");

        dispatched?;
        read
    }

    /// ディスパッチループ
    ///
    /// 受信キューが閉じたら（リーダー終了）`Ok` で戻り、原因はリーダー側の結果で返す。
    async fn dispatch_loop<W>(
        &self,
        sink: &mut W,
        mut frames: mpsc::Receiver<Frame>,
        cancel: &CancellationToken,
    ) -> Result<(), LiveError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 初回tickは即時に返るので読み捨てる
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("Dispatch loop cancelled");
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat(sink).await?;
                }
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    match self.handle_frame(frame).await {
                        Ok(()) => {}
                        Err(e) if e.is_auth_failure() => {
                            log::error!("Live connection rejected: {}", e);
                            return Err(e);
                        }
                        Err(e) => log::warn!("Frame handler failed: {}", e),
                    }
                }
            }
        }
    }

    /// 認証前は送らない
    async fn send_heartbeat<W>(&self, sink: &mut W) -> Result<(), LiveError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        if !self.state.is_authenticated() {
            return Ok(());
        }
        let seq = self.state.next_sequence();
        sink.send(Message::Binary(codec::encode(Operation::Heartbeat, seq, &[])))
            .await?;
        log::debug!("Heartbeat sent (seq: {})", seq);
        Ok(())
    }

    async fn handle_frame(&self, frame: Frame) -> Result<(), LiveError> {
        match frame.operation() {
            Some(Operation::AuthReply) => {
                let reply: AuthReply = serde_json::from_slice(&frame.body)
                    .map_err(|e| LiveError::MalformedAuthReply(e.to_string()))?;
                if reply.code != 0 {
                    return Err(LiveError::AuthRejected(reply.code));
                }
                if self.state.advance(ConnectionPhase::Authenticated) {
                    log::info!("Live connection authenticated");
                }
            }
            Some(Operation::HeartbeatReply) => {
                log::debug!("Heartbeat reply received (seq: {})", frame.sequence_id);
            }
            Some(Operation::SendSmsReply) => self.route_chat(&frame.body).await?,
            Some(op) => log::debug!("Ignoring unexpected {:?} frame", op),
            None => log::debug!("Ignoring unknown operation {}", frame.operation),
        }
        Ok(())
    }

    /// チャットペイロードを弾幕コマンドへ変換して送る
    ///
    /// ボディには複数のJSONオブジェクトが連結されていることがある。
    /// 型が合わないオブジェクトは読み飛ばし、構文が壊れていたら残りを捨てる。
    async fn route_chat(&self, body: &[u8]) -> Result<(), LiveError> {
        let values = serde_json::Deserializer::from_slice(body).into_iter::<serde_json::Value>();

        for value in values {
            let value = match value {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("Dropped malformed chat payload: {}", e);
                    break;
                }
            };
            let event: ChatEvent = match serde_json::from_value(value) {
                Ok(ev) => ev,
                Err(e) => {
                    log::debug!("Skipped chat event: {}", e);
                    continue;
                }
            };
            if !event.is_danmu() {
                continue;
            }

            let Some(command) = parse_danmu(&event.data.uname, &event.data.msg) else {
                continue;
            };
            log::info!("Command from {}: {:?}", command.actor, command.kind);
            self.commands
                .send(command)
                .await
                .map_err(|_| LiveError::TaskAborted("command receiver dropped".to_string()))?;
        }
        Ok(())
    }
}

/// リーダーループ
///
/// 壊れたフレームは捨てて読み続ける。切断・読み込みエラーで終了する。
async fn read_loop<R>(
    mut stream: R,
    frames: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) -> Result<(), LiveError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            message = stream.next() => message,
        };

        let data = match message {
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(reason))) => {
                log::info!("Live websocket closed by remote: {:?}", reason);
                return Err(LiveError::TransportClosed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                log::error!("Live websocket read failed: {}", e);
                return Err(e.into());
            }
            None => return Err(LiveError::TransportClosed),
        };

        let (decoded, rejected) = codec::decode_all(&data);
        if let Some(e) = rejected {
            log::debug!("Dropped malformed frame: {}", e);
        }

        for frame in decoded {
            // ディスパッチャが先に終了した
            if frames.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};

    type ServerWs = WebSocketStream<TcpStream>;

    /// テスト用のローカルWebSocketサーバーを起動し、接続を1本だけ受け付ける
    async fn local_server() -> (String, tokio::task::JoinHandle<ServerWs>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });
        (format!("ws://{}", addr), handle)
    }

    /// サーバー側で受け取ったフレーム（空ボディのハートビートも含む）
    struct Received {
        operation: Option<Operation>,
        sequence_id: u32,
        body: Vec<u8>,
    }

    async fn next_frame(ws: &mut ServerWs) -> Received {
        loop {
            if let Message::Binary(data) = ws.next().await.unwrap().unwrap() {
                let op = u32::from_be_bytes(data[8..12].try_into().unwrap());
                return Received {
                    operation: Operation::from_code(op),
                    sequence_id: u32::from_be_bytes(data[12..16].try_into().unwrap()),
                    body: data[16..].to_vec(),
                };
            }
        }
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_millis(50),
            inbound_capacity: 8,
        }
    }

    #[tokio::test]
    async fn test_auth_then_danmu_is_routed() {
        let (url, server) = local_server().await;
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client_cancel = cancel.clone();
        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, ConnectionConfig::default());
            conn.open(&url, r#"{"key":"opaque"}"#, &client_cancel).await
        });

        let mut ws = server.await.unwrap();
        let auth = next_frame(&mut ws).await;
        assert_eq!(auth.operation, Some(Operation::Auth));
        assert_eq!(auth.body, br#"{"key":"opaque"}"#.to_vec());

        ws.send(Message::Binary(codec::encode(Operation::AuthReply, 0, br#"{"code":0}"#)))
            .await
            .unwrap();

        // 連結されたJSON（弾幕以外のイベント・弾幕・雑談）
        let body = concat!(
            r#"{"cmd":"LIVE_OPEN_PLATFORM_SEND_GIFT","data":{"uname":"x"}}"#,
            r#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{"uname":"alice","msg":"点歌 夜骑"}}"#,
            r#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{"uname":"bob","msg":"晚上好"}}"#
        );
        ws.send(Message::Binary(codec::encode(Operation::SendSmsReply, 0, body.as_bytes())))
            .await
            .unwrap();

        let command = rx.recv().await.unwrap();
        assert_eq!(command, Command::pick("alice", "夜骑"));

        cancel.cancel();
        let result = client.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_auth_rejected_is_fatal() {
        let (url, server) = local_server().await;
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, ConnectionConfig::default());
            let result = conn.open(&url, "{}", &cancel).await;
            (result, conn.state().phase())
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;
        ws.send(Message::Binary(codec::encode(Operation::AuthReply, 0, br#"{"code":-1}"#)))
            .await
            .unwrap();

        let (result, phase) = client.await.unwrap();
        assert!(matches!(result, Err(LiveError::AuthRejected(-1))));
        assert_eq!(phase, ConnectionPhase::Closed);
    }

    #[tokio::test]
    async fn test_heartbeat_only_after_auth() {
        let (url, server) = local_server().await;
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client_cancel = cancel.clone();
        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, fast_config());
            conn.open(&url, "{}", &client_cancel).await
        });

        let mut ws = server.await.unwrap();
        let auth = next_frame(&mut ws).await;
        assert_eq!(auth.operation, Some(Operation::Auth));

        // 認証前はハートビートが来ない
        let early = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(early.is_err());

        ws.send(Message::Binary(codec::encode(Operation::AuthReply, 0, br#"{"code":0}"#)))
            .await
            .unwrap();

        let first = next_frame(&mut ws).await;
        let second = next_frame(&mut ws).await;
        assert_eq!(first.operation, Some(Operation::Heartbeat));
        assert_eq!(second.operation, Some(Operation::Heartbeat));
        assert!(second.sequence_id > first.sequence_id);
        assert!(first.sequence_id > auth.sequence_id);

        cancel.cancel();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (url, server) = local_server().await;
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client_cancel = cancel.clone();
        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, ConnectionConfig::default());
            conn.open(&url, "{}", &client_cancel).await
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;

        // ヘッダ長が不正なフレーム
        let mut bad = codec::encode(Operation::SendSmsReply, 0, b"{}");
        bad[5] = 20;
        ws.send(Message::Binary(bad)).await.unwrap();
        // 短すぎるフレーム
        ws.send(Message::Binary(vec![0, 0, 0])).await.unwrap();
        // 未知のオペコード
        let mut unknown = codec::encode(Operation::SendSmsReply, 0, b"{}");
        unknown[11] = 99;
        ws.send(Message::Binary(unknown)).await.unwrap();

        let body = r#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{"uname":"alice","msg":"删除 1"}}"#;
        ws.send(Message::Binary(codec::encode(Operation::SendSmsReply, 0, body.as_bytes())))
            .await
            .unwrap();

        let command = rx.recv().await.unwrap();
        assert_eq!(command.actor, "alice");
        assert_eq!(command.index, Some(0));

        cancel.cancel();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_remote_close_ends_session() {
        let (url, server) = local_server().await;
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, ConnectionConfig::default());
            conn.open(&url, "{}", &cancel).await
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;
        ws.close(None).await.unwrap();

        let result = client.await.unwrap();
        assert!(matches!(
            result,
            Err(LiveError::TransportClosed) | Err(LiveError::TransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_auth_reply_is_fatal() {
        let (url, server) = local_server().await;
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, ConnectionConfig::default());
            let result = conn.open(&url, "{}", &cancel).await;
            (result, conn.state().phase())
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;
        ws.send(Message::Binary(codec::encode(Operation::AuthReply, 0, b"not json")))
            .await
            .unwrap();

        let (result, phase) = tokio::time::timeout(Duration::from_secs(1), client)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LiveError::MalformedAuthReply(_))));
        assert_eq!(phase, ConnectionPhase::Closed);
    }

    #[tokio::test]
    async fn test_full_inbound_queue_blocks_without_dropping() {
        let (url, server) = local_server().await;
        // コマンド側を詰まらせて、受信キュー（容量8）を溢れさせる
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let client_cancel = cancel.clone();
        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, fast_config());
            conn.open(&url, "{}", &client_cancel).await
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;

        let total = fast_config().inbound_capacity * 4;
        for i in 0..total {
            let body = format!(
                r#"{{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{{"uname":"alice","msg":"点歌 song{}"}}}}"#,
                i
            );
            ws.send(Message::Binary(codec::encode(Operation::SendSmsReply, 0, body.as_bytes())))
                .await
                .unwrap();
        }

        for i in 0..total {
            let command = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(command, Command::pick("alice", format!("song{}", i)));
        }

        cancel.cancel();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_dispatching() {
        let (url, server) = local_server().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let client_cancel = cancel.clone();
        let client = tokio::spawn(async move {
            let conn = LiveConnection::new(tx, fast_config());
            conn.open(&url, "{}", &client_cancel).await
        });

        let mut ws = server.await.unwrap();
        let _auth = next_frame(&mut ws).await;
        ws.send(Message::Binary(codec::encode(Operation::AuthReply, 0, br#"{"code":0}"#)))
            .await
            .unwrap();

        // コマンドの受け手がいないので弾幕の処理は失敗する
        drop(rx);
        let body = r#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{"uname":"alice","msg":"点歌 夜骑"}}"#;
        for _ in 0..2 {
            ws.send(Message::Binary(codec::encode(Operation::SendSmsReply, 0, body.as_bytes())))
                .await
                .unwrap();
        }

        // 失敗後もハートビートが続き、接続は生きている
        let mut last = 0;
        for _ in 0..4 {
            let frame = tokio::time::timeout(Duration::from_secs(1), next_frame(&mut ws))
                .await
                .unwrap();
            assert_eq!(frame.operation, Some(Operation::Heartbeat));
            assert!(frame.sequence_id > last);
            last = frame.sequence_id;
        }
        assert!(!client.is_finished());

        cancel.cancel();
        assert!(client.await.unwrap().is_ok());
    }
}

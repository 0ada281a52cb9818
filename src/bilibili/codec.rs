//! 長連接パケットのコーデック
//!
//! ヘッダは16バイト固定・ビッグエンディアン：
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | パケット全長 |
//! | 4 | 2 | ヘッダ長（常に16） |
//! | 6 | 2 | プロトコルバージョン |
//! | 8 | 4 | オペレーションコード |
//! | 12 | 4 | シーケンスID |
//! | 16 | 可変 | ボディ |
//!
//! 検証は範囲外スライスを防ぐためだけに行う。内容の真正性は見ない。

use thiserror::Error;

/// ヘッダ長（バイト）
pub const HEADER_LEN: usize = 16;

/// ボディの最大長（バイト）
pub const MAX_BODY_SIZE: usize = 1 << 11;

/// パケットの最大長（バイト）
pub const MAX_PACKET_SIZE: usize = MAX_BODY_SIZE + HEADER_LEN;

/// 送信時に書き込むプロトコルバージョン
pub const PROTOCOL_VERSION: u16 = 0;

const PACKET_LEN_OFFSET: usize = 0;
const HEADER_LEN_OFFSET: usize = 4;
const VERSION_OFFSET: usize = 6;
const OPERATION_OFFSET: usize = 8;
const SEQUENCE_OFFSET: usize = 12;

/// オペレーションコード
///
/// 未知のコードは `Operation::from_code` が `None` を返し、受信側で無視される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Operation {
    Heartbeat = 2,
    HeartbeatReply = 3,
    SendSmsReply = 5,
    Auth = 7,
    AuthReply = 8,
}

impl Operation {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(Self::Heartbeat),
            3 => Some(Self::HeartbeatReply),
            5 => Some(Self::SendSmsReply),
            7 => Some(Self::Auth),
            8 => Some(Self::AuthReply),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// デコード時の拒否理由
///
/// いずれもプロトコル違反として呼び出し側で破棄される（セッションは継続）。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer too short for header: {0} bytes")]
    Truncated(usize),

    #[error("unexpected header length: {0}")]
    BadHeaderLength(u16),

    #[error("packet length out of range: {0}")]
    BadPacketLength(u32),

    #[error("packet length {declared} exceeds buffer size {available}")]
    Incomplete { declared: usize, available: usize },

    #[error("frame has an empty body")]
    EmptyBody,
}

/// 1パケット分のフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_length: u32,
    pub header_length: u16,
    pub version: u16,
    pub operation: u32,
    pub sequence_id: u32,
    pub body: Vec<u8>,
}

impl Frame {
    /// 送信用フレームを組み立てる
    pub fn new(operation: Operation, sequence_id: u32, body: Vec<u8>) -> Self {
        Self {
            packet_length: (HEADER_LEN + body.len()) as u32,
            header_length: HEADER_LEN as u16,
            version: PROTOCOL_VERSION,
            operation: operation.code(),
            sequence_id,
            body,
        }
    }

    /// 既知のオペレーションであれば返す
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_code(self.operation)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body.len());
        buf.extend_from_slice(&((HEADER_LEN + self.body.len()) as u32).to_be_bytes());
        buf.extend_from_slice(&(HEADER_LEN as u16).to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.operation.to_be_bytes());
        buf.extend_from_slice(&self.sequence_id.to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// フレームをバイト列にエンコード
///
/// `body.len() <= MAX_BODY_SIZE` は呼び出し側の責務で、ここでは検査しない。
pub fn encode(operation: Operation, sequence_id: u32, body: &[u8]) -> Vec<u8> {
    Frame::new(operation, sequence_id, body.to_vec()).encode()
}

/// バッファ先頭の1フレームをデコード
///
/// 成功時はフレームと消費したバイト数を返す。
fn decode_prefix(buf: &[u8]) -> Result<(Frame, usize), FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::Truncated(buf.len()));
    }

    let packet_length = read_u32(buf, PACKET_LEN_OFFSET);
    let header_length = read_u16(buf, HEADER_LEN_OFFSET);
    let version = read_u16(buf, VERSION_OFFSET);
    let operation = read_u32(buf, OPERATION_OFFSET);
    let sequence_id = read_u32(buf, SEQUENCE_OFFSET);

    if header_length as usize != HEADER_LEN {
        return Err(FrameError::BadHeaderLength(header_length));
    }

    let total = packet_length as usize;
    if !(HEADER_LEN..=MAX_PACKET_SIZE).contains(&total) {
        return Err(FrameError::BadPacketLength(packet_length));
    }
    if total > buf.len() {
        return Err(FrameError::Incomplete {
            declared: total,
            available: buf.len(),
        });
    }

    let frame = Frame {
        packet_length,
        header_length,
        version,
        operation,
        sequence_id,
        body: buf[HEADER_LEN..total].to_vec(),
    };
    Ok((frame, total))
}

/// 1フレームをデコード
///
/// ボディが空のフレームも拒否する。
pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
    let (frame, _) = decode_prefix(buf)?;
    if frame.body.is_empty() {
        return Err(FrameError::EmptyBody);
    }
    Ok(frame)
}

/// 1メッセージに連結された複数フレームをすべてデコード
///
/// 空ボディのフレームは読み飛ばす。ヘッダが壊れている場合は以降の
/// 境界が分からないため、その時点で打ち切って拒否理由を返す。
pub fn decode_all(buf: &[u8]) -> (Vec<Frame>, Option<FrameError>) {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        match decode_prefix(&buf[offset..]) {
            Ok((frame, consumed)) => {
                offset += consumed;
                if !frame.body.is_empty() {
                    frames.push(frame);
                }
            }
            Err(e) => return (frames, Some(e)),
        }
    }

    (frames, None)
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

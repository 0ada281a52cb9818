use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// 長連接のフェーズ
///
/// `Connecting → Authenticating → Authenticated → Closed` の一方向のみ。
/// `Closed` から戻ることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionPhase {
    Connecting = 0,
    Authenticating = 1,
    Authenticated = 2,
    Closed = 3,
}

impl ConnectionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Authenticating,
            2 => Self::Authenticated,
            _ => Self::Closed,
        }
    }
}

/// 1接続分の状態
///
/// リーダーとディスパッチャの両タスクから参照されるため、すべてアトミック。
#[derive(Debug)]
pub struct ConnectionState {
    phase: AtomicU8,
    authenticated: AtomicBool,
    /// 次に送るフレームのシーケンスID
    sequence_id: AtomicU32,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(ConnectionPhase::Connecting as u8),
            authenticated: AtomicBool::new(false),
            sequence_id: AtomicU32::new(0),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// フェーズを進める
    ///
    /// 後退する遷移は無視し、実際に遷移したかを返す。
    pub fn advance(&self, next: ConnectionPhase) -> bool {
        let next_code = next as u8;
        let mut current = self.phase.load(Ordering::SeqCst);
        loop {
            if next_code <= current {
                return false;
            }
            match self.phase.compare_exchange(current, next_code, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.authenticated
            .store(next == ConnectionPhase::Authenticated, Ordering::SeqCst);
        true
    }

    /// シーケンスIDを払い出す（単調増加）
    pub fn next_sequence(&self) -> u32 {
        self.sequence_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_moves_forward_only() {
        let state = ConnectionState::new();
        assert_eq!(state.phase(), ConnectionPhase::Connecting);

        assert!(state.advance(ConnectionPhase::Authenticating));
        assert!(!state.is_authenticated());

        assert!(state.advance(ConnectionPhase::Authenticated));
        assert!(state.is_authenticated());

        // 後退は無視
        assert!(!state.advance(ConnectionPhase::Authenticating));
        assert_eq!(state.phase(), ConnectionPhase::Authenticated);

        assert!(state.advance(ConnectionPhase::Closed));
        assert!(!state.is_authenticated());
        assert!(!state.advance(ConnectionPhase::Authenticated));
        assert_eq!(state.phase(), ConnectionPhase::Closed);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let state = ConnectionState::new();
        assert_eq!(state.next_sequence(), 0);
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.next_sequence(), 2);
    }
}

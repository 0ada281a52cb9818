// =============================================================================
// フィードバック掲示板
// =============================================================================
// コマンドの処理結果を短時間だけ配信画面に表示するための掲示板
// 新しいものが先頭。件数上限を超えたら最も古いものから捨てる
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// 既定の表示件数
pub const DEFAULT_BOARD_SIZE: usize = 3;

/// 既定の表示時間（秒）
pub const DEFAULT_MESSAGE_LIFETIME_SECS: i64 = 10;

/// 掲示板の1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub content: String,
    /// 期限（UNIX秒）
    pub expire_time: i64,
}

impl Message {
    fn is_alive(&self, now: DateTime<Utc>) -> bool {
        self.expire_time > now.timestamp()
    }
}

/// フィードバック掲示板
///
/// メモリ上のみ。再起動で消える。
#[derive(Debug)]
pub struct MessageBoard {
    messages: Mutex<VecDeque<Message>>,
    max_size: usize,
    lifetime: Duration,
}

impl MessageBoard {
    pub fn new(max_size: usize, lifetime: Duration) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
            lifetime,
        }
    }

    /// メッセージを先頭に追加
    pub fn push(&self, content: impl Into<String>) {
        self.push_at(content, Utc::now());
    }

    pub fn push_at(&self, content: impl Into<String>, now: DateTime<Utc>) {
        let message = Message {
            content: content.into(),
            expire_time: (now + self.lifetime).timestamp(),
        };
        log::debug!("Board message: {}", message.content);

        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push_front(message);
        messages.truncate(self.max_size);
    }

    /// 期限内のメッセージ（新しい順）
    pub fn messages(&self) -> Vec<Message> {
        self.messages_at(Utc::now())
    }

    pub fn messages_at(&self, now: DateTime<Utc>) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.is_alive(now))
            .cloned()
            .collect()
    }
}

impl Default for MessageBoard {
    fn default() -> Self {
        Self::new(
            DEFAULT_BOARD_SIZE,
            Duration::seconds(DEFAULT_MESSAGE_LIFETIME_SECS),
        )
    }
}

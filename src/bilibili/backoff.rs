use rand::Rng;
use std::time::Duration;

/// 認証リトライの最大試行回数
pub const MAX_AUTH_ATTEMPTS: u32 = 3;

/// 再接続間隔を管理する指数バックオフ
///
/// `base_delay` から倍増し、`max_delay` で頭打ちになる。
/// ジッタ有効時は各待機時間に最大25%のランダム幅を加える。
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    current_attempt: u32,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn with_config(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            current_attempt: 0,
            jitter: false,
        }
    }

    /// ジッタを有効にする
    pub fn jittered(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// 次の待機時間を返し、試行回数を1つ進める
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.current_attempt.min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        self.current_attempt += 1;

        if !self.jitter {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=spread);
        delay + Duration::from_millis(extra)
    }

    pub fn attempt_count(&self) -> u32 {
        self.current_attempt
    }

    /// まだリトライしてよいか
    pub fn should_retry(&self) -> bool {
        self.current_attempt < self.max_attempts
    }
}

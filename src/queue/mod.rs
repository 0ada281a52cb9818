//! 点歌キュー
//!
//! 有効なリクエスト（短冊）を順序付きで保持する。
//! - 件数は常に `max_size` 以下
//! - 任意で1人あたりの上限（主播を含む全員に適用、容量チェックの後）
//! - 操作できるのは作成者本人か主播のみ
//! - 変更のたびにチェックポイントへ保存し、失敗したら変更前に戻す
//!
//! 読み書きとも1つの排他ロックで処理する。件数が少ないので読み取りも同じロックで十分。

pub mod errors;
pub mod messages;
pub mod store;
pub mod ticket;

pub use errors::{QueueError, StoreError};
pub use messages::{Message, MessageBoard};
pub use store::{DurableStore, JsonFileStore, MemoryStore};
pub use ticket::{Ticket, TicketSlot, TicketView};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{DEFAULT_QUEUE_SIZE, DEFAULT_SUPER_ADMIN};
use crate::maimai::{smart_pick, Catalogue};

/// チェックポイント保存の試行回数
pub const SAVE_ATTEMPTS: u32 = 3;

/// キューの設定
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_size: usize,
    /// 1人あたりの上限（`None` は無制限）
    pub quota: Option<usize>,
    /// 全リクエストを操作できる名前
    pub super_admin: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_SIZE,
            quota: None,
            super_admin: DEFAULT_SUPER_ADMIN.to_string(),
        }
    }
}

/// 点歌キューの管理者
pub struct TicketMaster<S> {
    tickets: Mutex<Vec<Ticket>>,
    store: S,
    catalogue: Arc<Catalogue>,
    config: QueueConfig,
}

impl<S: DurableStore> TicketMaster<S> {
    /// チェックポイントから復元して作成
    ///
    /// チェックポイントが無い・壊れている場合は空のキューで始め、すぐ保存する。
    pub fn new(catalogue: Arc<Catalogue>, store: S, config: QueueConfig) -> Result<Self, QueueError> {
        let mut tickets = match store.load() {
            Ok(Some(tickets)) => tickets,
            Ok(None) => {
                store.save(&[])?;
                Vec::new()
            }
            Err(e) => {
                log::warn!("Failed to load queue checkpoint, starting empty: {}", e);
                store.save(&[])?;
                Vec::new()
            }
        };

        if tickets.len() > config.max_size {
            log::warn!(
                "Checkpoint has {} tickets, keeping the first {}",
                tickets.len(),
                config.max_size
            );
            tickets.truncate(config.max_size);
        }
        log::info!(
            "Queue ready: {}/{} tickets (super admin: {})",
            tickets.len(),
            config.max_size,
            config.super_admin
        );

        Ok(Self {
            tickets: Mutex::new(tickets),
            store,
            catalogue,
            config,
        })
    }

    /// 変更は必ずロールバックされるので、poisonしていても中身は一貫している
    fn lock(&self) -> MutexGuard<'_, Vec<Ticket>> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 点歌
    pub fn add_ticket(&self, creator: &str, keyword: &str) -> Result<String, QueueError> {
        let mut tickets = self.lock();

        if tickets.len() >= self.config.max_size {
            return Err(QueueError::QueueFull);
        }
        if let Some(quota) = self.config.quota {
            let owned = tickets.iter().filter(|t| t.creator == creator).count();
            if owned >= quota {
                return Err(QueueError::QuotaExceeded);
            }
        }

        let keyword = keyword.trim();
        let pick = smart_pick(&self.catalogue, keyword, 0)?;
        let title = pick.entry.title.clone();

        let snapshot = tickets.clone();
        tickets.push(Ticket::new(keyword, creator, pick, 0));
        self.persist(&mut tickets, snapshot)?;

        log::info!("{} picked {} ({})", creator, title, keyword);
        Ok("成功！".to_string())
    }

    /// 删除（完了・取り消し）
    pub fn finish_ticket(&self, operator: &str, index: Option<usize>) -> Result<String, QueueError> {
        let mut tickets = self.lock();
        let index = self.resolve_index(&tickets, operator, index)?;

        let snapshot = tickets.clone();
        let removed = tickets.remove(index);
        self.persist(&mut tickets, snapshot)?;

        log::info!("{} finished #{} {}", operator, index + 1, removed.entry.title);
        Ok("关闭成功".to_string())
    }

    /// 换歌（同じキーワードの次の候補へ）
    ///
    /// 作成者とキーワードは引き継ぎ、譜面は新しい曲の選択結果を使う。
    pub fn next_rank(&self, operator: &str, index: Option<usize>) -> Result<String, QueueError> {
        let mut tickets = self.lock();
        let index = self.resolve_index(&tickets, operator, index)?;

        let current = &tickets[index];
        let rank = current.rank + 1;
        let pick = smart_pick(&self.catalogue, &current.keyword, rank)?;
        let replacement = Ticket::new(current.keyword.clone(), current.creator.clone(), pick, rank);

        let snapshot = tickets.clone();
        tickets[index] = replacement;
        self.persist(&mut tickets, snapshot)?;

        log::info!(
            "{} switched #{} to {} (rank {})",
            operator,
            index + 1,
            tickets[index].entry.title,
            rank
        );
        Ok("切换成功".to_string())
    }

    /// 换谱（次の譜面へ、末尾の次は先頭）
    pub fn next_level(&self, operator: &str, index: Option<usize>) -> Result<String, QueueError> {
        let mut tickets = self.lock();
        let index = self.resolve_index(&tickets, operator, index)?;

        let snapshot = tickets.clone();
        tickets[index].rotate_level();
        self.persist(&mut tickets, snapshot)?;

        log::info!(
            "{} rotated #{} to level {}",
            operator,
            index + 1,
            tickets[index].level_index
        );
        Ok("切换成功".to_string())
    }

    /// 清空（主播のみ）
    pub fn clear_tickets(&self, operator: &str) -> Result<String, QueueError> {
        if operator != self.config.super_admin {
            return Err(QueueError::PermissionDenied);
        }

        let mut tickets = self.lock();
        let snapshot = std::mem::take(&mut *tickets);
        self.persist(&mut tickets, snapshot)?;

        log::info!("Queue cleared by {}", operator);
        Ok("清空成功".to_string())
    }

    /// 現在のキューのスナップショット
    pub fn snapshot(&self) -> Vec<Ticket> {
        self.lock().clone()
    }

    /// スナップショット → 空き枠の順に1度だけ辿るイテレータ
    ///
    /// 作成後のキュー変更は反映されない。
    pub fn slots(&self) -> impl Iterator<Item = TicketSlot> {
        let snapshot = self.snapshot();
        let empty = self.config.max_size.saturating_sub(snapshot.len());
        snapshot
            .into_iter()
            .map(TicketSlot::Active)
            .chain(std::iter::repeat(TicketSlot::Empty).take(empty))
    }

    /// 全枠を順に訪問する
    pub fn for_each_ticket(&self, visit: impl FnMut(TicketSlot)) {
        self.slots().for_each(visit);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// 対象インデックスを決め、操作権限を確認する
    ///
    /// `None` は操作者自身の最初のリクエスト。
    fn resolve_index(
        &self,
        tickets: &[Ticket],
        operator: &str,
        index: Option<usize>,
    ) -> Result<usize, QueueError> {
        let index = match index {
            Some(i) => i,
            None => tickets
                .iter()
                .position(|t| t.creator == operator)
                .ok_or(QueueError::BadIndex)?,
        };

        let ticket = tickets.get(index).ok_or(QueueError::BadIndex)?;
        if ticket.creator != operator && operator != self.config.super_admin {
            return Err(QueueError::PermissionDenied);
        }
        Ok(index)
    }

    /// 保存を試み、全て失敗したら `snapshot` に戻す
    fn persist(&self, tickets: &mut Vec<Ticket>, snapshot: Vec<Ticket>) -> Result<(), QueueError> {
        let mut attempt = 1;
        loop {
            match self.store.save(tickets) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    log::warn!(
                        "Failed to save queue checkpoint (attempt {}/{}): {}",
                        attempt,
                        SAVE_ATTEMPTS,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("Giving up saving queue checkpoint, rolling back: {}", e);
                    *tickets = snapshot;
                    return Err(e.into());
                }
            }
        }
    }
}

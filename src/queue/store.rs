use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::errors::StoreError;
use super::ticket::Ticket;

/// キューのチェックポイント保存先
pub trait DurableStore: Send + Sync {
    /// 保存済みのキューを読む。まだ無ければ `None`
    fn load(&self) -> Result<Option<Vec<Ticket>>, StoreError>;

    /// キュー全体を書き込む
    fn save(&self, tickets: &[Ticket]) -> Result<(), StoreError>;
}

/// JSONファイルに保存する
///
/// 一時ファイルに書いてからリネームするので、途中で落ちても前の内容が残る。
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Ticket>>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, tickets: &[Ticket]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec(tickets)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// メモリ上だけに保持する（チェックポイント無効時）
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Vec<Ticket>>>,
    #[cfg(test)]
    failures: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みのキュー（未保存なら `None`）
    pub fn saved(&self) -> Option<Vec<Ticket>> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 次の `count` 回の保存を失敗させる（テスト用）
    #[cfg(test)]
    pub fn fail_next_saves(&self, count: usize) {
        self.failures
            .store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Ticket>>, StoreError> {
        Ok(self.saved())
    }

    fn save(&self, tickets: &[Ticket]) -> Result<(), StoreError> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
        }

        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(tickets.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maimai::{CatalogueEntry, Pick};
    use tempfile::TempDir;

    fn ticket(creator: &str) -> Ticket {
        let entry = CatalogueEntry {
            id: 1,
            title: "Song".to_string(),
            image_path: String::new(),
            category: String::new(),
            levels: Vec::new(),
            aliases: Vec::new(),
        };
        Ticket::new("song", creator, Pick { entry, level_index: 0 }, 0)
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("runtime").join("tickets.checkpoint.json"));

        // まだ無い
        assert!(store.load().unwrap().is_none());

        let tickets = vec![ticket("alice"), ticket("bob")];
        store.save(&tickets).unwrap();
        assert_eq!(store.load().unwrap(), Some(tickets));

        store.save(&[]).unwrap();
        assert_eq!(store.load().unwrap(), Some(Vec::new()));
        // 一時ファイルは残らない
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tickets.checkpoint.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn test_memory_store_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next_saves(1);
        assert!(store.save(&[ticket("alice")]).is_err());
        assert!(store.saved().is_none());

        store.save(&[ticket("alice")]).unwrap();
        assert_eq!(store.saved().unwrap().len(), 1);
    }
}

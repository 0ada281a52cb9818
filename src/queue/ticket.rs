use serde::{Deserialize, Serialize};

use crate::maimai::{CatalogueEntry, Level, Pick};

/// 空き枠に表示するジャケット
pub const PLACEHOLDER_IMAGE: &str = "https://assets2.lxns.net/maimai/jacket/1444.png";
pub const PLACEHOLDER_TITLE: &str = "使用 点歌 <歌名> 来自动匹配封面";
pub const PLACEHOLDER_CREATOR: &str = "-";
pub const PLACEHOLDER_CATEGORY: &str = "等待选择";

/// 1件のリクエスト（短冊）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// 点歌時のキーワード（换歌で再検索に使う）
    pub keyword: String,
    pub creator: String,
    #[serde(rename = "record")]
    pub entry: CatalogueEntry,
    /// 同点候補の何番目か
    pub rank: usize,
    /// `entry.levels` のインデックス
    #[serde(rename = "level")]
    pub level_index: usize,
}

impl Ticket {
    pub fn new(keyword: impl Into<String>, creator: impl Into<String>, pick: Pick, rank: usize) -> Self {
        Self {
            keyword: keyword.into(),
            creator: creator.into(),
            entry: pick.entry,
            rank,
            level_index: pick.level_index,
        }
    }

    pub fn level(&self) -> Option<&Level> {
        self.entry.level(self.level_index)
    }

    /// 次の譜面へ（末尾の次は先頭）
    pub fn rotate_level(&mut self) {
        let count = self.entry.levels.len();
        self.level_index = if count == 0 {
            0
        } else {
            (self.level_index + 1) % count
        };
    }

    pub fn view(&self) -> TicketView {
        let level = self.level();
        TicketView {
            title: self.entry.title.clone(),
            keyword: self.keyword.clone(),
            creator: self.creator.clone(),
            image: self.entry.image_path.clone(),
            cover_info: level.map(|l| l.track_type.clone()).unwrap_or_default(),
            genre_info: self.entry.category.clone(),
            song_info: level
                .map(|l| format!("{}_{}", l.level, l.difficulty))
                .unwrap_or_default(),
        }
    }
}

/// 表示用の1枠
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketSlot {
    Active(Ticket),
    /// 空き枠（プレースホルダー表示）
    Empty,
}

impl TicketSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, TicketSlot::Empty)
    }

    pub fn view(&self) -> TicketView {
        match self {
            TicketSlot::Active(ticket) => ticket.view(),
            TicketSlot::Empty => TicketView::placeholder(),
        }
    }
}

/// フロントエンドへ渡す表示データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub title: String,
    pub keyword: String,
    pub creator: String,
    pub image: String,
    /// 譜面種別
    pub cover_info: String,
    /// ジャンル
    pub genre_info: String,
    /// `<レベル>_<難易度>`
    pub song_info: String,
}

impl TicketView {
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            keyword: String::new(),
            creator: PLACEHOLDER_CREATOR.to_string(),
            image: PLACEHOLDER_IMAGE.to_string(),
            cover_info: "std".to_string(),
            genre_info: PLACEHOLDER_CATEGORY.to_string(),
            song_info: "_bas".to_string(),
        }
    }
}

use serde::{Deserialize, Serialize};

/// コマンド種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 点歌（新規リクエスト）
    Pick,
    /// 删除（リクエスト完了・取り消し）
    Finish,
    /// 换谱（難易度切り替え）
    NextLevel,
    /// 换歌（次の候補曲へ切り替え）
    NextRank,
    /// 清空（全リクエスト削除、主播のみ）
    Clear,
}

/// チャットから解析された1件のコマンド
///
/// キューエンジンで1回だけ消費され、保持されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// 発言者名
    pub actor: String,
    /// 点歌時の曲名キーワード（それ以外は空）
    pub argument: String,
    /// 0始まりのリクエスト番号。`None` は「自分の最初のリクエスト」
    pub index: Option<usize>,
}

impl Command {
    pub fn pick(actor: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Pick,
            actor: actor.into(),
            argument: keyword.into(),
            index: None,
        }
    }

    pub fn targeted(kind: CommandKind, actor: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            kind,
            actor: actor.into(),
            argument: String::new(),
            index,
        }
    }
}

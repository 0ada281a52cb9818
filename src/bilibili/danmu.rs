//! 弾幕テキストのコマンドパーサー
//!
//! 先頭キーワードだけで判定する。トークナイザは持たないため、
//! キーワードと番号の間に余計な語があると解析できない。

use crate::command::{Command, CommandKind};

pub const KEYWORD_PICK: &str = "点歌";
pub const KEYWORD_REPICK: &str = "换歌";
pub const KEYWORD_NEXT_LEVEL: &str = "换谱";
pub const KEYWORD_DELETE: &str = "删除";
pub const KEYWORD_CLEAR: &str = "清空";

/// 点歌以外のキーワード（判定順）
const TARGETED_KEYWORDS: &[(&str, CommandKind)] = &[
    (KEYWORD_REPICK, CommandKind::NextRank),
    (KEYWORD_NEXT_LEVEL, CommandKind::NextLevel),
    (KEYWORD_DELETE, CommandKind::Finish),
    (KEYWORD_CLEAR, CommandKind::Clear),
];

/// 弾幕をコマンドに変換
///
/// コマンドでない弾幕は `None`。
///
/// 番号の規則：
/// - 番号なし → `index: None`（自分の最初のリクエスト）
/// - 整数 `n` → `n - 1`（表示は1始まり）。0以下は0に丸める
/// - それ以外の残りテキスト → コマンドではない
///
/// 清空は残りテキストがある場合コマンドとみなさない。
pub fn parse_danmu(actor: &str, message: &str) -> Option<Command> {
    let message = message.trim();

    if let Some(keyword) = message.strip_prefix(KEYWORD_PICK) {
        return Some(Command::pick(actor, keyword.trim()));
    }

    let (kind, rest) = TARGETED_KEYWORDS
        .iter()
        .find_map(|(keyword, kind)| message.strip_prefix(keyword).map(|rest| (*kind, rest.trim())))?;

    if rest.is_empty() {
        return Some(Command::targeted(kind, actor, None));
    }
    if kind == CommandKind::Clear {
        return None;
    }

    let number: i64 = rest.parse().ok()?;
    let index = number.saturating_sub(1).max(0) as usize;
    Some(Command::targeted(kind, actor, Some(index)))
}

//! SmartPick：キーワードから曲と譜面を選ぶ
//!
//! 手順：
//! 1. 先頭/末尾の譜面種別ヒント（std・标准・sd / dx・豪华）を取り除く
//! 2. 全曲の別名とあいまい一致でスコアを付け、スコア降順・ID昇順に並べる
//! 3. 完全一致（スコア100以上）かつ rank 0 なら、種別ヒントだけを見てそのまま選ぶ。
//!    取り除く前のキーワードが別名と完全一致する場合はそちらを優先し、ヒントは使わない
//! 4. それ以外は色ヒント（绿黄红紫白）も取り除いて並べ直し、
//!    種別ヒントが無ければもう一度探す
//! 5. `rank % 件数` 番目を選ぶ。同点グループ内では種別ヒントに合う曲が先
//! 6. 色ヒントがあれば `譜面数 - 5 + 色` の譜面、無ければ最初の譜面

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;
use thiserror::Error;

use super::catalogue::Catalogue;
use super::types::{CatalogueEntry, TrackType};

/// 完全一致とみなすスコア
pub const EXACT_SCORE: u32 = 100;

/// 色ヒント（緑→白 の順で 0〜4）
const COLOURS: [char; 5] = ['绿', '黄', '红', '紫', '白'];

/// 色ヒントが指す譜面は末尾5つ（bas〜remas）から数える
const COLOUR_SPAN: i64 = 5;

static TRACK_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(std|sd|dx|标准|豪华)").expect("Failed to compile track prefix regex")
});

static TRACK_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(std|sd|dx|标准|豪华)$").expect("Failed to compile track suffix regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("Keyword is empty")]
    EmptyKeyword,

    #[error("Catalogue is empty")]
    EmptyCatalogue,
}

/// 選曲結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    pub entry: CatalogueEntry,
    /// `entry.levels` のインデックス
    pub level_index: usize,
}

/// スコア付きの候補
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scored {
    pub score: u32,
    pub id: i64,
    /// カタログ内の位置
    position: usize,
}

/// キーワードから曲を選ぶ
///
/// 同じカタログ・キーワード・rank なら常に同じ結果になる。
pub fn smart_pick(catalogue: &Catalogue, raw_keyword: &str, rank: usize) -> Result<Pick, MatchError> {
    let keyword = raw_keyword.trim();
    if keyword.is_empty() {
        return Err(MatchError::EmptyKeyword);
    }
    if catalogue.is_empty() {
        return Err(MatchError::EmptyCatalogue);
    }

    let (track, text) = extract_track_hint(keyword);

    // 種別ヒントに見える文字を含む別名（例: DXCF）は、取り除く前に完全一致を見る
    if rank == 0 && track.is_some() {
        let literal = rank_entries(catalogue, keyword);
        if literal[0].score >= EXACT_SCORE {
            let chosen = select(catalogue, &literal, 0, None);
            log::debug!("Exact match for {}: {}", keyword, chosen.title);
            return Ok(pick(chosen, None, None));
        }
    }

    let ranked = rank_entries(catalogue, text);

    if rank == 0 && ranked[0].score >= EXACT_SCORE {
        let chosen = select(catalogue, &ranked, 0, track);
        log::debug!("Exact match for {}: {}", keyword, chosen.title);
        return Ok(pick(chosen, track, None));
    }

    let (colour, rest) = extract_colour_hint(text);
    let (track, rest) = match track {
        Some(_) => (track, rest),
        None => extract_track_hint(rest),
    };
    let ranked = if rest == text {
        ranked
    } else {
        rank_entries(catalogue, rest)
    };

    let chosen = select(catalogue, &ranked, rank, track);
    log::debug!(
        "Picked {} for {} (rank: {}, score: {})",
        chosen.title,
        keyword,
        rank,
        ranked[0].score
    );
    Ok(pick(chosen, track, colour))
}

/// 全曲をスコア降順・ID昇順に並べる
pub fn rank_entries(catalogue: &Catalogue, keyword: &str) -> Vec<Scored> {
    let keyword = keyword.trim().to_lowercase();

    let mut ranked: Vec<Scored> = catalogue
        .entries()
        .iter()
        .enumerate()
        .map(|(position, entry)| Scored {
            score: entry
                .aliases
                .iter()
                .map(|alias| similarity(alias, &keyword))
                .max()
                .unwrap_or(0),
            id: entry.id,
            position,
        })
        .collect();

    ranked.sort_by_key(|s| (Reverse(s.score), s.id));
    ranked
}

/// 0〜100 の類似度。大文字小文字を無視した完全一致は +1
fn similarity(alias: &str, keyword: &str) -> u32 {
    let alias = alias.trim().to_lowercase();
    let score = (strsim::normalized_levenshtein(&alias, keyword) * 100.0).round() as u32;
    if alias == keyword {
        score + 1
    } else {
        score
    }
}

/// `rank % 件数` 番目を選ぶ
///
/// 種別ヒントがある場合、同点グループ内でヒントに合う曲を前に寄せる。
fn select<'a>(
    catalogue: &'a Catalogue,
    ranked: &[Scored],
    rank: usize,
    track: Option<TrackType>,
) -> &'a CatalogueEntry {
    let entries = catalogue.entries();
    let mut ordered = ranked.to_vec();

    if let Some(track) = track {
        // スコアが同じなら、ヒントに合う曲 → ID昇順
        ordered.sort_by_key(|s| {
            (
                Reverse(s.score),
                !entries[s.position].has_track(track),
                s.id,
            )
        });
    }

    &entries[ordered[rank % ordered.len()].position]
}

fn pick(entry: &CatalogueEntry, track: Option<TrackType>, colour: Option<usize>) -> Pick {
    Pick {
        level_index: level_index(entry, track, colour),
        entry: entry.clone(),
    }
}

/// 譜面インデックスを決める
///
/// 種別ヒントに合う譜面があればその中から、無ければ全譜面から選ぶ。
/// 色ヒントの位置は `[0, 件数 - 1]` に収める。
pub fn level_index(entry: &CatalogueEntry, track: Option<TrackType>, colour: Option<usize>) -> usize {
    let mut candidates: Vec<usize> = match track {
        Some(track) => entry
            .levels
            .iter()
            .enumerate()
            .filter(|(_, l)| track.matches(&l.track_type))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };
    if candidates.is_empty() {
        candidates = (0..entry.levels.len()).collect();
    }
    if candidates.is_empty() {
        return 0;
    }

    let position = match colour {
        Some(colour) => {
            let last = candidates.len() as i64 - 1;
            (candidates.len() as i64 - COLOUR_SPAN + colour as i64).clamp(0, last) as usize
        }
        None => 0,
    };
    candidates[position]
}

/// 譜面種別ヒントを先頭→末尾の順に探して取り除く
///
/// 取り除くと空になる場合はヒントとみなさない。
pub fn extract_track_hint(text: &str) -> (Option<TrackType>, &str) {
    for (regex, is_prefix) in [(&*TRACK_PREFIX, true), (&*TRACK_SUFFIX, false)] {
        let Some(m) = regex.find(text) else {
            continue;
        };
        let rest = if is_prefix {
            &text[m.end()..]
        } else {
            &text[..m.start()]
        };
        let rest = rest.trim();
        if rest.is_empty() {
            continue;
        }
        let track = match m.as_str().to_lowercase().as_str() {
            "dx" | "豪华" => TrackType::Deluxe,
            _ => TrackType::Standard,
        };
        return (Some(track), rest);
    }
    (None, text)
}

/// 色ヒントを先頭→末尾の順に探して取り除く
pub fn extract_colour_hint(text: &str) -> (Option<usize>, &str) {
    let candidates = [
        text.chars().next().map(|c| (c, true)),
        text.chars().next_back().map(|c| (c, false)),
    ];

    for (c, is_prefix) in candidates.into_iter().flatten() {
        let Some(colour) = COLOURS.iter().position(|&x| x == c) else {
            continue;
        };
        let rest = if is_prefix {
            &text[c.len_utf8()..]
        } else {
            &text[..text.len() - c.len_utf8()]
        };
        let rest = rest.trim();
        if rest.is_empty() {
            continue;
        }
        return (Some(colour), rest);
    }
    (None, text)
}

use serde::{Deserialize, Serialize};

/// 1譜面（種別・難易度・レベル）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// 譜面種別（"std" / "dx" / "宴"）
    #[serde(rename = "type")]
    pub track_type: String,
    /// 難易度（"bas" / "adv" / "exp" / "mas" / "remas"）
    pub difficulty: String,
    /// 表示用レベル（"13+" など）
    pub level: String,
}

/// 楽曲カタログの1曲
///
/// プロセスの生存期間中は読み取り専用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub id: i64,
    pub title: String,
    /// ジャケット画像のURLまたはパス
    #[serde(rename = "image", default)]
    pub image_path: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub levels: Vec<Level>,
    /// 別名（タイトルを含む）。songs.json には無く、ロード時に埋める
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CatalogueEntry {
    /// 指定種別の譜面を持つか
    pub fn has_track(&self, track: TrackType) -> bool {
        self.levels.iter().any(|l| track.matches(&l.track_type))
    }

    /// 範囲外のインデックスは `None`
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }
}

/// 譜面種別のヒント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    /// スタンダード譜面
    Standard,
    /// でらっくす譜面
    Deluxe,
}

impl TrackType {
    pub fn code(self) -> &'static str {
        match self {
            TrackType::Standard => "std",
            TrackType::Deluxe => "dx",
        }
    }

    pub fn matches(self, track_type: &str) -> bool {
        track_type.eq_ignore_ascii_case(self.code())
    }
}

/// 別名リスト（aliases.json / 別名API共通の形式）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AliasList {
    #[serde(default)]
    pub aliases: Vec<AliasRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasRecord {
    pub song_id: i64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_parse() {
        let json = r#"{
            "id": 70,
            "title": "ナイト・オブ・ナイツ",
            "image": "https://example/70.png",
            "category": "东方Project",
            "levels": [
                {"type": "std", "difficulty": "bas", "level": "7"},
                {"type": "dx", "difficulty": "mas", "level": "13"}
            ]
        }"#;
        let entry: CatalogueEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.image_path, "https://example/70.png");
        assert_eq!(entry.levels[0].track_type, "std");
        assert!(entry.aliases.is_empty());
        assert!(entry.has_track(TrackType::Standard));
        assert!(entry.has_track(TrackType::Deluxe));
        assert!(entry.level(2).is_none());
    }

    #[test]
    fn test_track_type_matches_case_insensitively() {
        assert!(TrackType::Deluxe.matches("DX"));
        assert!(TrackType::Standard.matches("std"));
        assert!(!TrackType::Standard.matches("宴"));
    }
}

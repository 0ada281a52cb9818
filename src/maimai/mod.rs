// =============================================================================
// maimai 楽曲カタログ・選曲モジュール
// =============================================================================
// 楽曲カタログをロードし、弾幕のキーワードから曲と譜面を選ぶ
//
// 機能:
// - songs.json / aliases.json（＋別名API）からのカタログ構築
// - 別名に対するあいまい一致ランキング
// - 譜面種別・色ヒントによる曲と譜面の絞り込み
// =============================================================================

pub mod catalogue;
pub mod matcher;
pub mod types;

pub use catalogue::{Catalogue, CatalogueError, CatalogueLoader, JsonCatalogueLoader};
pub use matcher::{smart_pick, MatchError, Pick};
pub use types::{AliasList, AliasRecord, CatalogueEntry, Level, TrackType};

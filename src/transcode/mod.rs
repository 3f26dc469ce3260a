//! 行末コード・タブ変換モジュール
//!
//! ファイル取り込み・書き出し時の行末正規化と、表示カラム計算に
//! まつわるタブ処理を提供

pub mod line_endings;
pub mod tabs;

// 公開API
pub use line_endings::{
    convert_from_dos, convert_from_mac, convert_to_dos, convert_to_mac, detect_format, FileFormat,
};
pub use tabs::{char_width, expand_character, expand_tabs, realign_tabs, unexpand_tabs, MAX_EXP_CHAR_LEN};

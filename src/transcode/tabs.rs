//! タブ・表示幅ユーティリティ
//!
//! タブの展開・逆展開・再整列と、1文字の表示幅計算を提供する。
//! 表示幅の規約はこのモジュールに集約する。タブは次のタブ境界まで、
//! 制御文字は `<nul>` のような表示名の長さ、それ以外の文字は
//! Unicode の表示幅に従う。

use unicode_width::UnicodeWidthChar;

/// 1文字の画面展開が取り得る最大の長さ
///
/// タブ距離はこの値以下を前提とする。矩形操作が出力バッファを
/// 事前確保する際の1文字あたりの上限として使う。
pub const MAX_EXP_CHAR_LEN: usize = 20;

/// ASCII 制御文字（0x00..=0x1F）の表示名
const CONTROL_CODE_NAMES: [&str; 32] = [
    "nul", "soh", "stx", "etx", "eot", "enq", "ack", "bel",
    "bs", "ht", "nl", "vt", "np", "cr", "so", "si",
    "dle", "dc1", "dc2", "dc3", "dc4", "nak", "syn", "etb",
    "can", "em", "sub", "esc", "fs", "gs", "rs", "us",
];

/// 表示カラム `indent` に置かれた1文字の表示幅を返す
///
/// タブは次のタブ境界までの距離、NUL 代替文字と DEL は `<nul>` /
/// `<del>` の5カラム、その他の制御文字は表示名＋山括弧の長さ。
/// 印字可能文字は Unicode の表示幅（全角文字は2カラム）で数える。
pub fn char_width(ch: char, indent: usize, tab_dist: usize, null_subs_char: char) -> usize {
    if ch == null_subs_char {
        return 5;
    }
    if ch == '\t' {
        return tab_dist - (indent % tab_dist);
    }
    if (ch as u32) <= 31 {
        return CONTROL_CODE_NAMES[ch as usize].len() + 2;
    }
    if ch == '\u{7f}' {
        return 5;
    }
    UnicodeWidthChar::width(ch).unwrap_or(1)
}

/// 表示カラム `indent` に置かれた1文字を画面表現へ展開する
///
/// タブは空白列に、制御文字は `<soh>` のような表示名に変わる。
/// 結果の表示幅は常に [`char_width`] と一致する。
pub fn expand_character(ch: char, indent: usize, tab_dist: usize, null_subs_char: char) -> String {
    if ch == '\t' {
        return " ".repeat(tab_dist - (indent % tab_dist));
    }
    if ch == null_subs_char {
        return "<nul>".to_string();
    }
    if (ch as u32) <= 31 {
        return format!("<{}>", CONTROL_CODE_NAMES[ch as usize]);
    }
    if ch == '\u{7f}' {
        return "<del>".to_string();
    }
    ch.to_string()
}

/// テキスト中のタブをすべて空白に展開する
///
/// `start_indent` はテキスト先頭の表示カラム（矩形選択の切り出しなど、
/// 行頭以外から始まるテキストを渡すときに非ゼロ）。改行でカラムは
/// `start_indent` に戻る。
pub fn expand_tabs(text: &str, start_indent: usize, tab_dist: usize, null_subs_char: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut indent = start_indent;

    for ch in text.chars() {
        if ch == '\t' {
            let len = char_width('\t', indent, tab_dist, null_subs_char);
            for _ in 0..len {
                out.push(' ');
            }
            indent += len;
        } else if ch == '\n' {
            indent = start_indent;
            out.push(ch);
        } else {
            indent += char_width(ch, indent, tab_dist, null_subs_char);
            out.push(ch);
        }
    }

    out
}

/// 空白の連続をタブに戻す
///
/// 完全な逆変換ではないヒューリスティック。あるカラムのタブ展開
/// （3カラム以上）と一致する空白列だけをタブ1つに置き換える。
/// 閾値があるのは、文末の二連空白まで食わないようにするため。
pub fn unexpand_tabs(text: &str, start_indent: usize, tab_dist: usize, null_subs_char: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut indent = start_indent;
    let bytes = text.as_bytes();
    let mut pos = 0;

    while let Some(ch) = text[pos..].chars().next() {
        if ch == ' ' {
            let len = char_width('\t', indent, tab_dist, null_subs_char);
            if len >= 3 && pos + len <= text.len() && bytes[pos..pos + len].iter().all(|&b| b == b' ') {
                out.push('\t');
                pos += len;
                indent += len;
            } else {
                out.push(' ');
                pos += 1;
                indent += 1;
            }
        } else if ch == '\n' {
            indent = start_indent;
            out.push(ch);
            pos += 1;
        } else {
            indent += char_width(ch, indent, tab_dist, null_subs_char);
            out.push(ch);
            pos += ch.len_utf8();
        }
    }

    out
}

/// 開始カラムの変化に合わせてタブ・空白を組み直す
///
/// テキストの開始カラムが `orig_indent` から `new_indent` に移っても
/// 非空白文字の相対位置が保たれるようにする。両カラムのタブ境界からの
/// 余りが等しければ元のタブ構成のままでよい。そうでなければ一度
/// 空白に展開し、`use_tabs` のときだけ新カラム基準でタブに戻す。
pub fn realign_tabs(
    text: &str,
    orig_indent: usize,
    new_indent: usize,
    tab_dist: usize,
    use_tabs: bool,
    null_subs_char: char,
) -> String {
    if orig_indent % tab_dist == new_indent % tab_dist {
        return text.to_string();
    }

    let expanded = expand_tabs(text, orig_indent, tab_dist, null_subs_char);
    if !use_tabs {
        return expanded;
    }

    unexpand_tabs(&expanded, new_indent, tab_dist, null_subs_char)
}

/// 表示カラム `start_indent` から `to_indent` までを詰め物で埋める
///
/// `use_tabs` のときはタブ境界に収まる限りタブを使い、端数を空白で
/// 埋める。そうでなければ空白のみ。
pub(crate) fn add_padding(out: &mut String, start_indent: usize, to_indent: usize, tab_dist: usize, use_tabs: bool) {
    let mut indent = start_indent;

    if use_tabs {
        while indent < to_indent {
            let len = tab_dist - (indent % tab_dist);
            if len > 1 && indent + len <= to_indent {
                out.push('\t');
                indent += len;
            } else {
                out.push(' ');
                indent += 1;
            }
        }
    } else {
        while indent < to_indent {
            out.push(' ');
            indent += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_width_reflects_display_rules() {
        assert_eq!(char_width('a', 0, 8, '\0'), 1);
        assert_eq!(char_width('あ', 0, 8, '\0'), 2);
        assert_eq!(char_width('\t', 0, 8, '\0'), 8);
        assert_eq!(char_width('\t', 3, 8, '\0'), 5);
        assert_eq!(char_width('\u{1}', 0, 8, '\0'), 5); // <soh>
        assert_eq!(char_width('\u{7f}', 0, 8, '\0'), 5); // <del>
        assert_eq!(char_width('\u{6}', 0, 8, '\u{6}'), 5); // <nul> 代替
    }

    #[test]
    fn expand_character_names_control_codes() {
        assert_eq!(expand_character('\u{1}', 0, 8, '\0'), "<soh>");
        assert_eq!(expand_character('\u{1b}', 0, 8, '\0'), "<esc>");
        assert_eq!(expand_character('\u{7f}', 0, 8, '\0'), "<del>");
        assert_eq!(expand_character('\u{6}', 0, 8, '\u{6}'), "<nul>");
        assert_eq!(expand_character('x', 0, 8, '\0'), "x");
        assert_eq!(expand_character('\t', 2, 8, '\0'), "      ");
    }

    #[test]
    fn expand_tabs_reaches_next_stop() {
        assert_eq!(expand_tabs("\t", 0, 8, '\0'), "        ");
        assert_eq!(expand_tabs("ab\t", 0, 8, '\0'), "ab      ");
    }

    #[test]
    fn expand_tabs_newline_resets_indent() {
        assert_eq!(expand_tabs("a\t\nb\t", 0, 4, '\0'), "a   \nb   ");
    }

    #[test]
    fn expand_tabs_honors_start_indent() {
        assert_eq!(expand_tabs("\t", 3, 8, '\0'), "     ");
    }

    #[test]
    fn expand_tabs_counts_wide_chars() {
        // 全角2カラムの後のタブは6カラムで境界に届く
        assert_eq!(expand_tabs("あ\t", 0, 8, '\0'), "あ      ");
    }

    #[test]
    fn unexpand_tabs_recreates_full_stops() {
        assert_eq!(unexpand_tabs("        x", 0, 8, '\0'), "\tx");
        assert_eq!(unexpand_tabs("ab      cd", 0, 8, '\0'), "ab\tcd");
    }

    #[test]
    fn unexpand_tabs_keeps_runs_below_threshold() {
        // タブ距離2では展開長が3に届かず、何も変換されない
        assert_eq!(unexpand_tabs("a   b", 0, 2, '\0'), "a   b");
        // 文末の二連空白は温存される
        assert_eq!(unexpand_tabs("end.  next", 0, 8, '\0'), "end.  next");
    }

    #[test]
    fn realign_tabs_is_identity_for_same_phase() {
        assert_eq!(realign_tabs("\tab", 4, 12, 8, true, '\0'), "\tab");
    }

    #[test]
    fn realign_tabs_rebuilds_at_new_indent() {
        assert_eq!(realign_tabs("\ta", 0, 4, 8, true, '\0'), "\t    a");
        assert_eq!(realign_tabs("\ta", 0, 4, 8, false, '\0'), "        a");
    }

    #[test]
    fn add_padding_prefers_tabs_when_allowed() {
        let mut out = String::new();
        add_padding(&mut out, 0, 8, 8, true);
        assert_eq!(out, "\t");

        let mut out = String::new();
        add_padding(&mut out, 5, 8, 8, true);
        assert_eq!(out, "\t");

        let mut out = String::new();
        add_padding(&mut out, 0, 10, 8, true);
        assert_eq!(out, "\t  ");

        // タブ境界を跨げない短い詰め物は空白になる
        let mut out = String::new();
        add_padding(&mut out, 0, 3, 8, true);
        assert_eq!(out, "   ");

        let mut out = String::new();
        add_padding(&mut out, 0, 8, 8, false);
        assert_eq!(out, "        ");
    }
}

//! テキストバッファファサード
//!
//! ギャップバッファを包む公開の編集・照会インタフェース。タブ処理、
//! NUL 代替、選択範囲の追従、変更通知をここで調停する。編集は一律に
//! 検査付きで、範囲外や文字境界外の位置は黙って丸めずにエラーを返す。
//!
//! 変更コールバックは編集の完了後、登録順に同期呼び出しされる。
//! コールバックに拒否権はなく、通知中に同じバッファを変更しては
//! ならない（呼び出し側の責務）。

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use log::error;

use crate::buffer::gap_buffer::GapBuffer;
use crate::buffer::selection::{SelectionSpan, TextSelection};
use crate::error::{buffer, BufferError};
use crate::transcode::tabs::{add_padding, char_width, expand_character, realign_tabs, MAX_EXP_CHAR_LEN};

/// 変更通知イベント
///
/// `deleted_text` は編集前に捕捉された削除テキスト。`n_restyled` は
/// 再表示系の通知で使う素通し値で、編集では常に 0。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyEvent {
    pub pos: usize,
    pub n_inserted: usize,
    pub n_deleted: usize,
    pub n_restyled: usize,
    pub deleted_text: String,
}

/// 削除前通知イベント
///
/// 削除が実行される前に届くため、観測側は消える内容をまだ参照できる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreDeleteEvent {
    pub pos: usize,
    pub n_deleted: usize,
}

/// コールバック登録の識別子（解除に使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type ModifyCallback = Box<dyn FnMut(&ModifyEvent)>;
type PreDeleteCallback = Box<dyn FnMut(&PreDeleteEvent)>;

/// NUL 代替文字の候補、使われにくい順
const NULL_SUBS_PREFERENCE: [u8; 25] = [
    1, 2, 3, 4, 5, 6, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 28, 29, 30, 31, 11, 7,
];

#[derive(Debug, Clone, Copy)]
enum SelectionKind {
    Primary,
    Secondary,
    Highlight,
}

/// テキストバッファ
///
/// ギャップバッファと3つの選択範囲（primary / secondary / highlight）を
/// 専有し、削除前・変更後のコールバック列を保持する。
pub struct TextBuffer {
    gap: GapBuffer,
    tab_distance: usize,
    use_tabs: bool,
    null_subs_char: char,
    primary: TextSelection,
    secondary: TextSelection,
    highlight: TextSelection,
    modify_cbs: VecDeque<(CallbackId, ModifyCallback)>,
    pre_delete_cbs: VecDeque<(CallbackId, PreDeleteCallback)>,
    next_callback_id: u64,
    cursor_pos_hint: usize,
}

impl TextBuffer {
    /// 空のテキストバッファを作成
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 予約サイズ付きで空のテキストバッファを作成
    ///
    /// ファイルサイズが分かっているときに再確保を避けるために使う。
    pub fn with_capacity(reserve: usize) -> Self {
        Self {
            gap: GapBuffer::with_capacity(reserve),
            tab_distance: 8,
            use_tabs: true,
            null_subs_char: '\0',
            primary: TextSelection::default(),
            secondary: TextSelection::default(),
            highlight: TextSelection::default(),
            modify_cbs: VecDeque::new(),
            pre_delete_cbs: VecDeque::new(),
            next_callback_id: 0,
            cursor_pos_hint: 0,
        }
    }

    /// 初期内容付きでテキストバッファを作成（コールバックは発火しない）
    pub fn from_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.gap.assign(text);
        buffer
    }

    // ------------------------------------------------------------------
    // 全体・範囲の照会
    // ------------------------------------------------------------------

    /// テキストのバイト数を取得
    pub fn len(&self) -> usize {
        self.gap.len()
    }

    /// 空かどうかを判定
    pub fn is_empty(&self) -> bool {
        self.gap.is_empty()
    }

    /// 全テキストをコピーとして取得
    pub fn text(&self) -> String {
        self.gap.to_string()
    }

    /// 全テキストをゼロコピーの連続ビューとして取得
    ///
    /// ギャップが端へ寄るため内部レイアウトは変わるが論理内容は
    /// 変わらない。借用は次の可変操作まで有効。
    pub fn to_view(&mut self) -> &str {
        self.gap.to_view()
    }

    /// 指定範囲 `[start, end)` のテキストを取得
    pub fn text_in_range(&self, start: usize, end: usize) -> buffer::Result<String> {
        self.gap.substring(start, end)
    }

    /// 指定位置の文字を取得
    pub fn char_at(&self, pos: usize) -> buffer::Result<char> {
        self.gap.char_at(pos)
    }

    /// 指定位置のバイトを取得
    pub fn byte_at(&self, pos: usize) -> buffer::Result<u8> {
        self.gap.byte_at(pos)
    }

    /// 指定位置のテキストとプローブ文字列を辞書順比較
    pub fn cmp_range(&self, pos: usize, text: &str) -> Ordering {
        self.gap.compare(pos, text)
    }

    /// 直近の編集後にカーソルを置くとよい位置のヒント
    pub fn cursor_pos_hint(&self) -> usize {
        self.cursor_pos_hint
    }

    // ------------------------------------------------------------------
    // 編集
    // ------------------------------------------------------------------

    /// 全内容を置き換える
    ///
    /// 旧内容全体への削除前通知のあと、ギャップを中央に置いた
    /// ストレージへ再確保し、旧内容全体を削除テキストとして変更通知する。
    pub fn set_text(&mut self, text: &str) {
        let deleted_len = self.gap.len();
        self.call_pre_delete_cbs(0, deleted_len);

        let deleted_text = self.gap.to_string();
        self.gap.assign(text);

        self.update_selections(0, deleted_len, 0);
        self.call_modify_cbs(0, deleted_len, text.len(), 0, deleted_text);
    }

    /// 指定位置に文字列を挿入
    pub fn insert(&mut self, pos: usize, text: &str) -> buffer::Result<()> {
        self.gap.check_pos(pos)?;

        // 何も消えない編集でも削除前コールバックは呼ぶ
        self.call_pre_delete_cbs(pos, 0);

        let n_inserted = self.insert_internal(pos, text)?;
        self.cursor_pos_hint = pos + n_inserted;
        self.call_modify_cbs(pos, 0, n_inserted, 0, String::new());
        Ok(())
    }

    /// 指定位置に1文字を挿入
    pub fn insert_char(&mut self, pos: usize, ch: char) -> buffer::Result<()> {
        let mut encoded = [0u8; 4];
        self.insert(pos, ch.encode_utf8(&mut encoded))
    }

    /// 末尾に文字列を追加
    pub fn append(&mut self, text: &str) -> buffer::Result<()> {
        self.insert(self.gap.len(), text)
    }

    /// 指定範囲 `[start, end)` を削除
    pub fn remove(&mut self, start: usize, end: usize) -> buffer::Result<()> {
        self.gap.check_range(start, end)?;

        self.call_pre_delete_cbs(start, end - start);
        let deleted_text = self.gap.substring_unchecked(start, end);
        self.delete_internal(start, end)?;
        self.cursor_pos_hint = start;
        self.call_modify_cbs(start, end - start, 0, 0, deleted_text);
        Ok(())
    }

    /// 指定範囲 `[start, end)` を文字列で置き換える
    pub fn replace(&mut self, start: usize, end: usize, text: &str) -> buffer::Result<()> {
        self.gap.check_range(start, end)?;

        self.call_pre_delete_cbs(start, end - start);
        let deleted_text = self.gap.substring_unchecked(start, end);
        self.delete_internal(start, end)?;
        self.insert_internal(start, text)?;
        self.cursor_pos_hint = start + text.len();
        self.call_modify_cbs(start, end - start, text.len(), 0, deleted_text);
        Ok(())
    }

    /// 別バッファの範囲をこのバッファへ写す
    ///
    /// 選択範囲は追従するが、コールバックは発火しない。
    pub fn copy_from(
        &mut self,
        other: &TextBuffer,
        from_start: usize,
        from_end: usize,
        to_pos: usize,
    ) -> buffer::Result<()> {
        other.gap.check_range(from_start, from_end)?;
        self.gap.check_pos(to_pos)?;

        let text = other.gap.substring_unchecked(from_start, from_end);
        self.insert_internal(to_pos, &text)?;
        Ok(())
    }

    /// 通知なしの挿入（ギャップ更新と選択追従のみ）
    fn insert_internal(&mut self, pos: usize, text: &str) -> buffer::Result<usize> {
        self.gap.insert(pos, text)?;
        self.update_selections(pos, 0, text.len());
        Ok(text.len())
    }

    /// 通知なしの削除（ギャップ更新と選択追従のみ）
    fn delete_internal(&mut self, start: usize, end: usize) -> buffer::Result<()> {
        self.gap.erase(start, end)?;
        self.update_selections(start, end - start, 0);
        Ok(())
    }

    // ------------------------------------------------------------------
    // タブ設定と表示幅
    // ------------------------------------------------------------------

    /// タブ距離を取得
    pub fn tab_distance(&self) -> usize {
        self.tab_distance
    }

    /// タブ距離を変更する
    ///
    /// バッファ全体の表示桁の解釈が一斉に変わるため、旧設定のまま
    /// 全体への削除前通知を行い、続けて全体を覆う変更通知
    /// （`n_inserted == n_deleted == len`、削除テキストは全文）を出す。
    /// `tab_distance` は 1 以上であること。
    pub fn set_tab_distance(&mut self, tab_distance: usize) {
        debug_assert!(tab_distance >= 1);

        // 旧タブ設定が生きているうちに削除前通知を済ませる
        self.call_pre_delete_cbs(0, self.gap.len());

        self.tab_distance = tab_distance;

        let text = self.gap.to_string();
        let len = text.len();
        self.call_modify_cbs(0, len, len, 0, text);
    }

    /// 矩形操作の詰め物にタブを使ってよいか
    pub fn use_tabs(&self) -> bool {
        self.use_tabs
    }

    /// 矩形操作の詰め物にタブを使うかを設定
    pub fn set_use_tabs(&mut self, use_tabs: bool) {
        self.use_tabs = use_tabs;
    }

    /// 表示カラム `indent` に置かれた1文字の表示幅
    pub fn character_width(&self, ch: char, indent: usize) -> usize {
        char_width(ch, indent, self.tab_distance, self.null_subs_char)
    }

    /// 表示カラム `indent` に置かれた1文字の画面表現
    pub fn expand_char(&self, ch: char, indent: usize) -> String {
        expand_character(ch, indent, self.tab_distance, self.null_subs_char)
    }

    /// 指定位置の文字の画面表現を取得
    pub fn expanded_character_at(&self, pos: usize, indent: usize) -> buffer::Result<String> {
        let ch = self.gap.char_at(pos)?;
        Ok(self.expand_char(ch, indent))
    }

    // ------------------------------------------------------------------
    // NUL 代替
    // ------------------------------------------------------------------

    /// 現在の NUL 代替文字（まだ選ばれていなければ `'\0'`）
    pub fn null_subs_char(&self) -> char {
        self.null_subs_char
    }

    /// 取り込みテキスト中の NUL を代替文字へ置き換える
    ///
    /// テキストが現在の代替文字を含むなら、バッファと取り込みテキストの
    /// 双方に現れないバイトを候補表から選び直し、バッファ内の旧代替も
    /// 付け替える。候補が尽きたときだけ失敗する（呼び出し側は貼り付けを
    /// 拒否できる）。
    pub fn substitute_null_chars(&mut self, text: &str) -> buffer::Result<String> {
        let mut hist = [false; 256];
        histogram_characters(text.as_bytes(), &mut hist);

        if hist[self.null_subs_char as usize] {
            {
                let (left, right) = self.gap.str_slices(0, self.gap.len());
                histogram_characters(left.as_bytes(), &mut hist);
                histogram_characters(right.as_bytes(), &mut hist);
            }
            let new_subs = choose_null_subs_char(&hist)
                .ok_or(BufferError::NullSubstitutionExhausted)?;

            // バッファに入っている旧代替文字は新しい代替に付け替える
            if self.null_subs_char != '\0' {
                let old = self.null_subs_char;
                let replaced = self
                    .gap
                    .to_string()
                    .replace(old, new_subs.encode_utf8(&mut [0u8; 4]));
                self.gap.assign(&replaced);
            }
            self.null_subs_char = new_subs;
        }

        if hist[0] {
            Ok(text.replace('\0', self.null_subs_char.encode_utf8(&mut [0u8; 4])))
        } else {
            Ok(text.to_string())
        }
    }

    /// バッファから取り出したテキストの代替文字を NUL へ戻す
    pub fn unsubstitute_null_chars(&self, text: &str) -> String {
        if self.null_subs_char == '\0' {
            return text.to_string();
        }
        text.replace(self.null_subs_char, "\0")
    }

    // ------------------------------------------------------------------
    // 行と表示桁
    // ------------------------------------------------------------------

    /// `pos` を含む行の先頭位置
    ///
    /// 走査系の照会は位置を末尾・文字境界へ丸めて扱う（編集系と違い
    /// 全域で定義された関数にしてある）。
    pub fn line_start(&self, pos: usize) -> usize {
        match self.search_backward(pos, "\n") {
            Some(found) => found + 1,
            None => 0,
        }
    }

    /// `pos` を含む行の末尾位置（行を終える改行の位置、なければ `len()`）
    pub fn line_end(&self, pos: usize) -> usize {
        self.search_forward(pos, "\n").unwrap_or_else(|| self.gap.len())
    }

    /// `[start, end)` に含まれる改行の数
    pub fn count_lines(&self, start: usize, end: usize) -> usize {
        let start = self.floor_boundary(start);
        let end = self.floor_boundary(end).max(start);
        self.chars_in(start, end).filter(|&(_, ch)| ch == '\n').count()
    }

    /// `start_pos` から `n_lines` 行先の行頭位置（足りなければ `len()`）
    pub fn skip_lines(&self, start_pos: usize, n_lines: usize) -> usize {
        if n_lines == 0 {
            return start_pos.min(self.gap.len());
        }
        let mut count = 0;
        for (pos, ch) in self.chars_in(self.floor_boundary(start_pos), self.gap.len()) {
            if ch == '\n' {
                count += 1;
                if count == n_lines {
                    return pos + 1;
                }
            }
        }
        self.gap.len()
    }

    /// `start_pos` から `n_lines` 行前の行頭位置
    ///
    /// `n_lines == 0` は現在行の行頭を意味する。`start_pos` の位置の
    /// 文字が改行でも数えない。
    pub fn rewind_lines(&self, start_pos: usize, n_lines: usize) -> usize {
        let start_pos = self.floor_boundary(start_pos);
        if start_pos <= 1 {
            return 0;
        }
        let mut line_count = 0;
        for (pos, ch) in self.chars_in(0, start_pos).rev() {
            if ch == '\n' {
                if line_count >= n_lines {
                    return pos + 1;
                }
                line_count += 1;
            }
        }
        0
    }

    /// 行頭から `target_pos` までの表示文字数
    ///
    /// タブや制御文字の展開後の桁数で数える。
    pub fn count_displayed_chars(&self, line_start_pos: usize, target_pos: usize) -> usize {
        let start = self.floor_boundary(line_start_pos);
        let end = self.floor_boundary(target_pos).max(start);
        let mut char_count = 0;
        for (_, ch) in self.chars_in(start, end) {
            char_count += char_width(ch, char_count, self.tab_distance, self.null_subs_char);
        }
        char_count
    }

    /// 行頭から表示文字数で `n_chars` 進んだ位置
    ///
    /// 行末の改行または `len()` で止まる。
    pub fn skip_displayed_chars(&self, line_start_pos: usize, n_chars: usize) -> usize {
        let mut char_count = 0;
        for (pos, ch) in self.chars_in(self.floor_boundary(line_start_pos), self.gap.len()) {
            if char_count >= n_chars || ch == '\n' {
                return pos;
            }
            char_count += char_width(ch, char_count, self.tab_distance, self.null_subs_char);
        }
        self.gap.len()
    }

    /// `start_pos` 以降で `chars` のいずれかの文字が現れる最初の位置
    pub fn search_forward(&self, start_pos: usize, chars: &str) -> Option<usize> {
        self.chars_in(self.floor_boundary(start_pos), self.gap.len())
            .find(|&(_, ch)| chars.contains(ch))
            .map(|(pos, _)| pos)
    }

    /// `start_pos` より前で `chars` のいずれかの文字が現れる最後の位置
    pub fn search_backward(&self, start_pos: usize, chars: &str) -> Option<usize> {
        self.chars_in(0, self.floor_boundary(start_pos))
            .rev()
            .find(|&(_, ch)| chars.contains(ch))
            .map(|(pos, _)| pos)
    }

    /// 指定範囲を（バイト位置, 文字）の列として走査する
    fn chars_in(&self, start: usize, end: usize) -> impl DoubleEndedIterator<Item = (usize, char)> + '_ {
        let (left, right) = self.gap.str_slices(start, end);
        let mid = start + left.len();
        left.char_indices()
            .map(move |(i, ch)| (start + i, ch))
            .chain(right.char_indices().map(move |(i, ch)| (mid + i, ch)))
    }

    /// 位置を末尾以内・文字境界へ丸める
    fn floor_boundary(&self, pos: usize) -> usize {
        let mut pos = pos.min(self.gap.len());
        while !self.gap.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    // ------------------------------------------------------------------
    // 矩形操作
    // ------------------------------------------------------------------

    /// `start_pos` を含む行の表示桁 `column` にテキストを列方向で挿入
    ///
    /// テキストの幅と行数ぶんの矩形の空間を開け、`column` より右の
    /// テキストを右へずらす。`(挿入バイト数, 削除バイト数)` を返す。
    /// どちらも行頭からの数。
    pub fn insert_column(
        &mut self,
        column: usize,
        start_pos: usize,
        text: &str,
    ) -> buffer::Result<(usize, usize)> {
        self.gap.check_pos(start_pos)?;

        let n_lines = count_newlines(text);
        let line_start_pos = self.line_start(start_pos);
        let n_deleted = self.line_end(self.skip_lines(start_pos, n_lines)) - line_start_pos;

        self.call_pre_delete_cbs(line_start_pos, n_deleted);
        let deleted_text = self
            .gap
            .substring_unchecked(line_start_pos, line_start_pos + n_deleted);

        let (insert_deleted, n_inserted, end_pos) =
            self.insert_col(column, line_start_pos, text)?;
        self.cursor_pos_hint = end_pos;

        if n_deleted != insert_deleted {
            error!("lacuna: internal consistency check ins1 failed");
        }

        self.call_modify_cbs(line_start_pos, n_deleted, n_inserted, 0, deleted_text);
        Ok((n_inserted, n_deleted))
    }

    /// `start_pos` を含む行から表示桁 `rect_start..rect_end` に上書き
    ///
    /// `rect_end` が `None` ならテキストの表示幅から右端を求める。
    /// `(挿入バイト数, 削除バイト数)` を返す。
    pub fn overlay_rectangular(
        &mut self,
        start_pos: usize,
        rect_start: usize,
        rect_end: Option<usize>,
        text: &str,
    ) -> buffer::Result<(usize, usize)> {
        self.gap.check_pos(start_pos)?;

        let rect_end = rect_end.unwrap_or_else(|| {
            rect_start + text_width(text, self.tab_distance, self.null_subs_char)
        });
        let n_lines = count_newlines(text);
        let line_start_pos = self.line_start(start_pos);
        let n_deleted = self.line_end(self.skip_lines(start_pos, n_lines)) - line_start_pos;

        self.call_pre_delete_cbs(line_start_pos, n_deleted);
        let deleted_text = self
            .gap
            .substring_unchecked(line_start_pos, line_start_pos + n_deleted);

        let (insert_deleted, n_inserted, end_pos) =
            self.overlay_rect(line_start_pos, rect_start, rect_end, text)?;
        self.cursor_pos_hint = end_pos;

        if n_deleted != insert_deleted {
            error!("lacuna: internal consistency check ovly1 failed");
        }

        self.call_modify_cbs(line_start_pos, n_deleted, n_inserted, 0, deleted_text);
        Ok((n_inserted, n_deleted))
    }

    /// 矩形範囲を削除し、右側のテキストを左へ詰める
    pub fn remove_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        self.gap.check_range(start, end)?;

        let start = self.line_start(start);
        let end = self.line_end(end);

        self.call_pre_delete_cbs(start, end - start);
        let deleted_text = self.gap.substring_unchecked(start, end);
        let (n_inserted, end_pos) = self.delete_rect(start, end, rect_start, rect_end)?;
        self.cursor_pos_hint = end_pos;
        self.call_modify_cbs(start, end - start, n_inserted, 0, deleted_text);
        Ok(())
    }

    /// 矩形範囲をくり抜いて空白にする（右側のテキストは動かさない）
    pub fn clear_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        let n_lines = self.count_lines(start, end);
        let newlines = "\n".repeat(n_lines);
        self.overlay_rectangular(start, rect_start, Some(rect_end), &newlines)?;
        Ok(())
    }

    /// 矩形範囲をテキストで置き換える
    ///
    /// テキストの行数が矩形より少なければ挿入側に改行を足して行数を
    /// 揃え、多ければ矩形の末尾に行を足して場所を空ける。
    pub fn replace_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
        text: &str,
    ) -> buffer::Result<()> {
        self.gap.check_range(start, end)?;

        // 列方向の削除・挿入は行全体を書き換えるので行境界に広げる
        let start = self.line_start(start);
        let end = self.line_end(end);

        self.call_pre_delete_cbs(start, end - start);

        let n_inserted_lines = count_newlines(text);
        let n_deleted_lines = self.count_lines(start, end);
        let mut lines_padded = 0;

        let ins_text: String;
        if n_inserted_lines < n_deleted_lines {
            let mut padded = String::with_capacity(text.len() + n_deleted_lines - n_inserted_lines);
            padded.push_str(text);
            for _ in 0..n_deleted_lines - n_inserted_lines {
                padded.push('\n');
            }
            ins_text = padded;
        } else if n_deleted_lines < n_inserted_lines {
            lines_padded = n_inserted_lines - n_deleted_lines;
            for _ in 0..lines_padded {
                self.insert_internal(end, "\n")?;
            }
            ins_text = text.to_string();
        } else {
            ins_text = text.to_string();
        }

        let deleted_text = self.gap.substring_unchecked(start, end);

        let (delete_inserted, _) = self.delete_rect(start, end, rect_start, rect_end)?;
        let (insert_deleted, insert_inserted, end_pos) =
            self.insert_col(rect_start, start, &ins_text)?;
        self.cursor_pos_hint = end_pos;

        if insert_deleted != delete_inserted + lines_padded {
            error!("lacuna: internal consistency check repl1 failed");
        }

        self.call_modify_cbs(start, end - start, insert_inserted, 0, deleted_text);
        Ok(())
    }

    /// 矩形範囲のテキストを行ごとに切り出して取得
    ///
    /// 各行の表示桁 `rect_start..rect_end` を改行で繋ぎ、左端が桁0に
    /// 来たものとしてタブを整え直して返す。
    pub fn text_in_rectangle(
        &self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<String> {
        self.gap.check_range(start, end)?;
        Ok(self.rect_text(start, end, rect_start, rect_end))
    }

    fn rect_text(&self, start: usize, end: usize, rect_start: usize, rect_end: usize) -> String {
        let start = self.line_start(start);
        let end = self.line_end(end);

        let mut out = String::with_capacity(end - start);
        let mut line_start = start;
        while line_start <= end {
            let (sel_left, sel_right) = self.rect_sel_bounds_for_copy(line_start, rect_start, rect_end);
            out.push_str(&self.gap.substring_unchecked(sel_left, sel_right));
            out.push('\n');
            line_start = self.line_end(sel_right) + 1;
        }
        if !out.is_empty() {
            out.pop();
        }

        // 左端が桁0から始まったことにしてタブを整える
        realign_tabs(&out, rect_start, 0, self.tab_distance, self.use_tabs, self.null_subs_char)
    }

    /// 矩形選択のコピーで使う行内のバイト範囲を求める
    ///
    /// 左端を跨ぐタブは含め、制御文字は含めない。右端を跨ぐタブは
    /// 切り落とす。
    fn rect_sel_bounds_for_copy(
        &self,
        line_start_pos: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> (usize, usize) {
        let mut pos = line_start_pos;
        let mut indent = 0;

        // 選択の左端を探す
        while pos < self.gap.len() {
            let ch = self.gap.char_at_unchecked(pos);
            if ch == '\n' {
                break;
            }
            let width = char_width(ch, indent, self.tab_distance, self.null_subs_char);
            if indent + width > rect_start {
                if indent != rect_start && ch != '\t' {
                    pos += ch.len_utf8();
                    indent += width;
                }
                break;
            }
            indent += width;
            pos += ch.len_utf8();
        }
        let sel_start = pos;

        // 右端を探す
        while pos < self.gap.len() {
            let ch = self.gap.char_at_unchecked(pos);
            if ch == '\n' {
                break;
            }
            let width = char_width(ch, indent, self.tab_distance, self.null_subs_char);
            indent += width;
            if indent > rect_end {
                if indent - width != rect_end && ch != '\t' {
                    pos += ch.len_utf8();
                }
                break;
            }
            pos += ch.len_utf8();
        }

        (sel_start, pos)
    }

    /// 通知なしの列方向挿入。`(削除数, 挿入数, 末尾位置ヒント)` を返す
    fn insert_col(
        &mut self,
        column: usize,
        start_pos: usize,
        ins_text: &str,
    ) -> buffer::Result<(usize, usize, usize)> {
        let start = self.line_start(start_pos);
        let n_lines = count_newlines(ins_text) + 1;
        let ins_width = text_width(ins_text, self.tab_distance, self.null_subs_char);
        let end = self.line_end(self.skip_lines(start, n_lines - 1));

        // 対象行と挿入テキストの行を突き合わせ、行ごとに組み直す
        let mut out = String::with_capacity(end - start + ins_text.len() + n_lines * MAX_EXP_CHAR_LEN);
        let mut line_start = start;
        let mut end_offset = 0;
        let mut last_len = 0;
        for ins_line in ins_text.split('\n') {
            let line_end = self.line_end(line_start);
            let line = self.gap.substring_unchecked(line_start, line_end);
            let (out_line, offset) = insert_col_in_line(
                &line,
                ins_line,
                column,
                ins_width,
                self.tab_distance,
                self.use_tabs,
                self.null_subs_char,
            );
            end_offset = offset;
            last_len = out_line.len();
            out.push_str(&out_line);
            out.push('\n');
            line_start = if line_end < self.gap.len() { line_end + 1 } else { self.gap.len() };
        }
        if !out.is_empty() {
            out.pop(); // 行ごとに足した余分な改行を戻す
        }

        self.delete_internal(start, end)?;
        self.insert_internal(start, &out)?;

        let end_pos = start + out.len() - last_len + end_offset;
        Ok((end - start, out.len(), end_pos))
    }

    /// 通知なしの矩形上書き。`(削除数, 挿入数, 末尾位置ヒント)` を返す
    fn overlay_rect(
        &mut self,
        start_pos: usize,
        rect_start: usize,
        rect_end: usize,
        ins_text: &str,
    ) -> buffer::Result<(usize, usize, usize)> {
        let start = self.line_start(start_pos);
        let n_lines = count_newlines(ins_text) + 1;
        let end = self.line_end(self.skip_lines(start, n_lines - 1));

        let mut out =
            String::with_capacity(end - start + ins_text.len() + n_lines * (rect_end + MAX_EXP_CHAR_LEN));
        let mut line_start = start;
        let mut end_offset = 0;
        let mut last_len = 0;
        for ins_line in ins_text.split('\n') {
            let line_end = self.line_end(line_start);
            let line = self.gap.substring_unchecked(line_start, line_end);
            let (mut out_line, offset) = overlay_rect_in_line(
                &line,
                ins_line,
                rect_start,
                rect_end,
                self.tab_distance,
                self.use_tabs,
                self.null_subs_char,
            );
            // 行末の空白は詰め物で増殖しやすいので刈り取る
            while out_line.len() > 1 && (out_line.ends_with(' ') || out_line.ends_with('\t')) {
                out_line.pop();
            }
            end_offset = offset;
            last_len = out_line.len();
            out.push_str(&out_line);
            out.push('\n');
            line_start = if line_end < self.gap.len() { line_end + 1 } else { self.gap.len() };
        }
        if !out.is_empty() {
            out.pop();
        }

        self.delete_internal(start, end)?;
        self.insert_internal(start, &out)?;

        let end_pos = start + out.len() - last_len + end_offset;
        Ok((end - start, out.len(), end_pos))
    }

    /// 通知なしの矩形削除。`(置換後の挿入数, 末尾位置ヒント)` を返す
    ///
    /// タブ展開の影響で、削除なのにバッファが伸びることもある。
    fn delete_rect(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<(usize, usize)> {
        let start = self.line_start(start);
        let end = self.line_end(end);

        let mut out = String::with_capacity(end - start + MAX_EXP_CHAR_LEN * 2);
        let mut line_start = start;
        let mut end_offset = 0;
        let mut last_len = 0;
        while line_start <= self.gap.len() && line_start <= end {
            let line_end = self.line_end(line_start);
            let line = self.gap.substring_unchecked(line_start, line_end);
            let (out_line, offset) = delete_rect_from_line(
                &line,
                rect_start,
                rect_end,
                self.tab_distance,
                self.use_tabs,
                self.null_subs_char,
            );
            end_offset = offset;
            last_len = out_line.len();
            out.push_str(&out_line);
            out.push('\n');
            line_start = line_end + 1;
        }
        if !out.is_empty() {
            out.pop();
        }

        self.delete_internal(start, end)?;
        self.insert_internal(start, &out)?;

        let end_pos = start + out.len() - last_len + end_offset;
        Ok((out.len(), end_pos))
    }

    // ------------------------------------------------------------------
    // 選択範囲
    // ------------------------------------------------------------------

    /// primary 選択を設定
    pub fn select(&mut self, start: usize, end: usize) -> buffer::Result<()> {
        self.set_selection(SelectionKind::Primary, start, end)
    }

    /// primary 矩形選択を設定（行スパンは行境界に広げられる）
    pub fn select_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        self.set_rect_selection(SelectionKind::Primary, start, end, rect_start, rect_end)
    }

    /// primary 選択を解除
    pub fn unselect(&mut self) {
        self.unselect_kind(SelectionKind::Primary);
    }

    /// primary 選択の範囲を取得
    pub fn selection_position(&self) -> Option<SelectionSpan> {
        self.primary.position()
    }

    /// primary 選択のテキストを取得（未選択なら空文字列）
    pub fn selection_text(&self) -> String {
        self.selection_text_for(self.primary)
    }

    /// primary 選択の内容を削除
    pub fn remove_selection(&mut self) -> buffer::Result<()> {
        self.remove_selected(SelectionKind::Primary)
    }

    /// primary 選択の内容を置き換え、選択を解除する
    pub fn replace_selection(&mut self, text: &str) -> buffer::Result<()> {
        self.replace_selected(SelectionKind::Primary, text)
    }

    /// secondary 選択を設定
    pub fn secondary_select(&mut self, start: usize, end: usize) -> buffer::Result<()> {
        self.set_selection(SelectionKind::Secondary, start, end)
    }

    /// secondary 矩形選択を設定
    pub fn secondary_select_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        self.set_rect_selection(SelectionKind::Secondary, start, end, rect_start, rect_end)
    }

    /// secondary 選択を解除
    pub fn secondary_unselect(&mut self) {
        self.unselect_kind(SelectionKind::Secondary);
    }

    /// secondary 選択の範囲を取得
    pub fn secondary_selection_position(&self) -> Option<SelectionSpan> {
        self.secondary.position()
    }

    /// secondary 選択のテキストを取得
    pub fn secondary_selection_text(&self) -> String {
        self.selection_text_for(self.secondary)
    }

    /// secondary 選択の内容を削除
    pub fn remove_secondary_selection(&mut self) -> buffer::Result<()> {
        self.remove_selected(SelectionKind::Secondary)
    }

    /// secondary 選択の内容を置き換え、選択を解除する
    pub fn replace_secondary_selection(&mut self, text: &str) -> buffer::Result<()> {
        self.replace_selected(SelectionKind::Secondary, text)
    }

    /// highlight 範囲を設定
    pub fn highlight(&mut self, start: usize, end: usize) -> buffer::Result<()> {
        self.set_selection(SelectionKind::Highlight, start, end)
    }

    /// highlight 矩形範囲を設定
    pub fn highlight_rectangular(
        &mut self,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        self.set_rect_selection(SelectionKind::Highlight, start, end, rect_start, rect_end)
    }

    /// highlight 範囲を解除
    pub fn unhighlight(&mut self) {
        self.unselect_kind(SelectionKind::Highlight);
    }

    /// highlight 範囲を取得
    pub fn highlight_position(&self) -> Option<SelectionSpan> {
        self.highlight.position()
    }

    /// 単一行として扱える primary 選択範囲、なければカーソル位置
    ///
    /// 矩形選択は先頭行の桁範囲を線形レンジに読み替える。未選択なら
    /// `(cursor_pos_hint, cursor_pos_hint)` の空レンジを返す。
    pub fn simple_selection_or_cursor(&self) -> (usize, usize) {
        match self.primary.position() {
            None => (self.cursor_pos_hint, self.cursor_pos_hint),
            Some(SelectionSpan::Linear { start, end }) => (start, end),
            Some(SelectionSpan::Rectangular { start, rect_start, rect_end, .. }) => {
                let line_start = self.line_start(start);
                (
                    self.skip_displayed_chars(line_start, rect_start),
                    self.skip_displayed_chars(line_start, rect_end),
                )
            }
        }
    }

    fn selection(&self, kind: SelectionKind) -> &TextSelection {
        match kind {
            SelectionKind::Primary => &self.primary,
            SelectionKind::Secondary => &self.secondary,
            SelectionKind::Highlight => &self.highlight,
        }
    }

    fn selection_mut(&mut self, kind: SelectionKind) -> &mut TextSelection {
        match kind {
            SelectionKind::Primary => &mut self.primary,
            SelectionKind::Secondary => &mut self.secondary,
            SelectionKind::Highlight => &mut self.highlight,
        }
    }

    fn set_selection(&mut self, kind: SelectionKind, start: usize, end: usize) -> buffer::Result<()> {
        self.gap.check_pos(start)?;
        self.gap.check_pos(end)?;

        let old = *self.selection(kind);
        self.selection_mut(kind).set(start, end);
        let new = *self.selection(kind);
        self.redisplay_selection(old, new);
        Ok(())
    }

    fn set_rect_selection(
        &mut self,
        kind: SelectionKind,
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    ) -> buffer::Result<()> {
        self.gap.check_pos(start)?;
        self.gap.check_pos(end)?;
        if rect_start > rect_end {
            return Err(BufferError::InvertedRange { start: rect_start, end: rect_end });
        }

        // 矩形選択の行スパンは常に行境界に揃える
        let start = self.line_start(start);
        let end = self.line_end(end);

        let old = *self.selection(kind);
        self.selection_mut(kind).set_rectangular(start, end, rect_start, rect_end);
        let new = *self.selection(kind);
        self.redisplay_selection(old, new);
        Ok(())
    }

    fn unselect_kind(&mut self, kind: SelectionKind) {
        let old = *self.selection(kind);
        self.selection_mut(kind).unselect();
        let new = *self.selection(kind);
        self.redisplay_selection(old, new);
    }

    fn selection_text_for(&self, sel: TextSelection) -> String {
        if !sel.is_visible() {
            return String::new();
        }
        match sel.position() {
            Some(SelectionSpan::Rectangular { start, end, rect_start, rect_end }) => {
                self.rect_text(start, end, rect_start, rect_end)
            }
            Some(SelectionSpan::Linear { start, end }) => self.gap.substring_unchecked(start, end),
            None => String::new(),
        }
    }

    fn remove_selected(&mut self, kind: SelectionKind) -> buffer::Result<()> {
        let sel = *self.selection(kind);
        if !sel.is_visible() {
            return Ok(());
        }
        match sel.position() {
            Some(SelectionSpan::Rectangular { start, end, rect_start, rect_end }) => {
                self.remove_rectangular(start, end, rect_start, rect_end)
            }
            Some(SelectionSpan::Linear { start, end }) => self.remove(start, end),
            None => Ok(()),
        }
    }

    fn replace_selected(&mut self, kind: SelectionKind, text: &str) -> buffer::Result<()> {
        let old = *self.selection(kind);
        if !old.is_visible() {
            return Ok(());
        }

        match old.position() {
            Some(SelectionSpan::Rectangular { start, end, rect_start, rect_end }) => {
                self.replace_rectangular(start, end, rect_start, rect_end, text)?;
            }
            Some(SelectionSpan::Linear { start, end }) => {
                self.replace(start, end, text)?;
            }
            None => return Ok(()),
        }

        // 線形の置換では選択が編集点の空選択に潰れて残るが、矩形の置換は
        // 中身が消えたことを検知できない。どちらも明示的に解除する
        self.selection_mut(kind).unselect();
        let new = *self.selection(kind);
        self.redisplay_selection(old, new);
        Ok(())
    }

    /// 編集に合わせて3つの選択をまとめて付け替える
    fn update_selections(&mut self, pos: usize, n_deleted: usize, n_inserted: usize) {
        self.primary.update_for_modification(pos, n_deleted, n_inserted);
        self.secondary.update_for_modification(pos, n_deleted, n_inserted);
        self.highlight.update_for_modification(pos, n_deleted, n_inserted);
    }

    /// 選択の変化を表示側へ通知する
    ///
    /// テキストは変わらないため、変化した領域を `n_restyled` に載せた
    /// 零編集イベントを出す。旧新の形が違う（矩形フラグや桁範囲の変化）
    /// か範囲が交わらなければ併合した1イベント、交われば変化した
    /// 前後2領域にそれぞれ1イベント。
    fn redisplay_selection(&mut self, old: TextSelection, new: TextSelection) {
        let old_start = old.start();
        let new_start = new.start();
        // 矩形選択は行末より先の描画も消させるため1文字ぶん広げる
        let old_end = old.end() + usize::from(old.is_rectangular());
        let new_end = new.end() + usize::from(new.is_rectangular());

        if !old.is_visible() && !new.is_visible() {
            return;
        }
        if !old.is_visible() {
            self.call_modify_cbs(new_start, 0, 0, new_end - new_start, String::new());
            return;
        }
        if !new.is_visible() {
            self.call_modify_cbs(old_start, 0, 0, old_end - old_start, String::new());
            return;
        }

        if old.is_rectangular() != new.is_rectangular()
            || (old.is_rectangular() && old.rect_bounds() != new.rect_bounds())
        {
            let start = old_start.min(new_start);
            let end = old_end.max(new_end);
            self.call_modify_cbs(start, 0, 0, end - start, String::new());
            return;
        }

        if old_end < new_start || new_end < old_start {
            self.call_modify_cbs(old_start, 0, 0, old_end - old_start, String::new());
            self.call_modify_cbs(new_start, 0, 0, new_end - new_start, String::new());
            return;
        }

        // 交わる場合は変化した前側・後側だけを通知する
        let ch1_start = old_start.min(new_start);
        let ch1_end = old_start.max(new_start);
        let ch2_start = old_end.min(new_end);
        let ch2_end = old_end.max(new_end);

        if ch1_start != ch1_end {
            self.call_modify_cbs(ch1_start, 0, 0, ch1_end - ch1_start, String::new());
        }
        if ch2_start != ch2_end {
            self.call_modify_cbs(ch2_start, 0, 0, ch2_end - ch2_start, String::new());
        }
    }

    // ------------------------------------------------------------------
    // コールバック
    // ------------------------------------------------------------------

    /// 変更コールバックを登録する（登録順に呼ばれる）
    pub fn add_modify_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(&ModifyEvent) + 'static,
    {
        let id = self.next_id();
        self.modify_cbs.push_back((id, Box::new(callback)));
        id
    }

    /// 変更コールバックを既存のものより先に呼ばれるよう登録する
    pub fn add_high_priority_modify_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(&ModifyEvent) + 'static,
    {
        let id = self.next_id();
        self.modify_cbs.push_front((id, Box::new(callback)));
        id
    }

    /// 変更コールバックの登録を解除する
    pub fn remove_modify_callback(&mut self, id: CallbackId) {
        match self.modify_cbs.iter().position(|(cb_id, _)| *cb_id == id) {
            Some(index) => {
                self.modify_cbs.remove(index);
            }
            None => error!("lacuna: can't find modify callback to remove"),
        }
    }

    /// 削除前コールバックを登録する
    pub fn add_pre_delete_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(&PreDeleteEvent) + 'static,
    {
        let id = self.next_id();
        self.pre_delete_cbs.push_back((id, Box::new(callback)));
        id
    }

    /// 削除前コールバックの登録を解除する
    pub fn remove_pre_delete_callback(&mut self, id: CallbackId) {
        match self.pre_delete_cbs.iter().position(|(cb_id, _)| *cb_id == id) {
            Some(index) => {
                self.pre_delete_cbs.remove(index);
            }
            None => error!("lacuna: can't find pre-delete callback to remove"),
        }
    }

    fn next_id(&mut self) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        id
    }

    fn call_modify_cbs(
        &mut self,
        pos: usize,
        n_deleted: usize,
        n_inserted: usize,
        n_restyled: usize,
        deleted_text: String,
    ) {
        let event = ModifyEvent { pos, n_inserted, n_deleted, n_restyled, deleted_text };
        for (_, callback) in self.modify_cbs.iter_mut() {
            callback(&event);
        }
    }

    fn call_pre_delete_cbs(&mut self, pos: usize, n_deleted: usize) {
        let event = PreDeleteEvent { pos, n_deleted };
        for (_, callback) in self.pre_delete_cbs.iter_mut() {
            callback(&event);
        }
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("len", &self.gap.len())
            .field("tab_distance", &self.tab_distance)
            .field("use_tabs", &self.use_tabs)
            .field("cursor_pos_hint", &self.cursor_pos_hint)
            .finish_non_exhaustive()
    }
}

/// テキスト中の改行の数
fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// テキストの表示幅（複数行なら最長の行の幅）
fn text_width(text: &str, tab_dist: usize, null_subs_char: char) -> usize {
    let mut width = 0;
    let mut max_width = 0;
    for ch in text.chars() {
        if ch == '\n' {
            max_width = max_width.max(width);
            width = 0;
        } else {
            width += char_width(ch, width, tab_dist, null_subs_char);
        }
    }
    max_width.max(width)
}

/// 単一行 `line` の表示桁 `column` に `ins_line` を差し込み、
/// `ins_width` の幅を空けて残りを続ける
///
/// 返り値は組み直した行と、行頭から挿入テキスト右端までのバイト数
/// （カーソル位置ヒント用）。
fn insert_col_in_line(
    line: &str,
    ins_line: &str,
    column: usize,
    ins_width: usize,
    tab_dist: usize,
    use_tabs: bool,
    null_subs_char: char,
) -> (String, usize) {
    let mut out = String::with_capacity(line.len() + ins_line.len() + MAX_EXP_CHAR_LEN);
    let mut indent = 0;
    let mut len = 0;
    let mut pos = 0;

    // 桁 column の手前まで行をコピーする
    while let Some(ch) = line[pos..].chars().next() {
        len = char_width(ch, indent, tab_dist, null_subs_char);
        if indent + len > column {
            break;
        }
        indent += len;
        out.push(ch);
        pos += ch.len_utf8();
    }

    // column が文字の途中に落ちた場合、タブなら落として後の詰め物に
    // 任せ、制御文字ならそのまま写して桁を進める
    let post_col_indent;
    if indent < column && pos < line.len() {
        post_col_indent = indent + len;
        let ch = line[pos..].chars().next().unwrap_or('\0');
        if ch == '\t' {
            pos += 1;
        } else {
            out.push(ch);
            pos += ch.len_utf8();
            indent += len;
        }
    } else {
        post_col_indent = indent;
    }

    // column の先にテキストがなく挿入もないならここまで
    if ins_line.is_empty() && pos >= line.len() {
        let end_offset = out.len();
        return (out, end_offset);
    }

    // 行が column に届かなければ詰め物をする
    if indent < column {
        add_padding(&mut out, indent, column, tab_dist, use_tabs);
        indent = column;
    }

    // 挿入テキストを桁0起点から新しい桁へ整え直してコピーする
    if !ins_line.is_empty() {
        let retabbed = realign_tabs(ins_line, 0, indent, tab_dist, use_tabs, null_subs_char);
        for ch in retabbed.chars() {
            out.push(ch);
            indent += char_width(ch, indent, tab_dist, null_subs_char);
        }
    }

    // 元の行が column の先へ続かなければここまで
    if pos >= line.len() {
        let end_offset = out.len();
        return (out, end_offset);
    }

    // column + 挿入幅 +（境界で割れなかった文字のはみ出し分）まで詰める
    let to_indent = column + ins_width + (post_col_indent - column);
    add_padding(&mut out, indent, to_indent, tab_dist, use_tabs);
    let indent = to_indent;

    // column 以降のテキストを整え直して書き出す
    let retabbed = realign_tabs(&line[pos..], post_col_indent, indent, tab_dist, use_tabs, null_subs_char);
    let end_offset = out.len();
    out.push_str(&retabbed);
    (out, end_offset)
}

/// 単一行 `line` から表示桁 `rect_start..rect_end` の文字を取り除く
///
/// 境界を跨ぐタブの展開で行が伸びることもある。返り値は組み直した行と、
/// 行頭から削除点までのバイト数。
fn delete_rect_from_line(
    line: &str,
    rect_start: usize,
    rect_end: usize,
    tab_dist: usize,
    use_tabs: bool,
    null_subs_char: char,
) -> (String, usize) {
    let mut out = String::with_capacity(line.len() + MAX_EXP_CHAR_LEN * 2);
    let mut indent = 0;
    let mut pos = 0;

    // rect_start までコピー（境界を跨ぐタブは落とす）
    while let Some(ch) = line[pos..].chars().next() {
        if indent > rect_start {
            break;
        }
        let len = char_width(ch, indent, tab_dist, null_subs_char);
        if indent + len > rect_start && (indent == rect_start || ch == '\t') {
            break;
        }
        indent += len;
        out.push(ch);
        pos += ch.len_utf8();
    }
    let pre_rect_indent = indent;

    // rect_start と rect_end の間を読み飛ばす
    while let Some(ch) = line[pos..].chars().next() {
        if indent >= rect_end {
            break;
        }
        indent += char_width(ch, indent, tab_dist, null_subs_char);
        pos += ch.len_utf8();
    }
    let post_rect_indent = indent;

    // 行が rect_end の手前で終わっていればここまで
    if pos >= line.len() {
        let end_offset = out.len();
        return (out, end_offset);
    }

    // 境界を跨いで消えたタブ・制御文字のぶんの空きを詰める
    let indent = (rect_start + post_rect_indent - rect_end).max(pre_rect_indent);
    add_padding(&mut out, pre_rect_indent, indent, tab_dist, use_tabs);

    // 残りをコピーする。桁が変わっていれば非空白文字の位置を保つよう
    // タブを整え直す
    let retabbed = realign_tabs(&line[pos..], post_rect_indent, indent, tab_dist, use_tabs, null_subs_char);
    let end_offset = out.len();
    out.push_str(&retabbed);
    (out, end_offset)
}

/// 単一行 `line` の表示桁 `rect_start..rect_end` に `ins_line` を上書きする
///
/// 返り値は組み直した行と、行頭から挿入テキスト右端までのバイト数。
fn overlay_rect_in_line(
    line: &str,
    ins_line: &str,
    rect_start: usize,
    rect_end: usize,
    tab_dist: usize,
    use_tabs: bool,
    null_subs_char: char,
) -> (String, usize) {
    let mut out = String::with_capacity(line.len() + ins_line.len() + rect_end + MAX_EXP_CHAR_LEN);
    let mut in_indent = 0;
    let mut out_indent = 0;
    let mut len = 0;
    let mut pos = 0;

    // rect_start の手前まで行をコピーする
    while let Some(ch) = line[pos..].chars().next() {
        len = char_width(ch, in_indent, tab_dist, null_subs_char);
        if in_indent + len > rect_start {
            break;
        }
        in_indent += len;
        out_indent += len;
        out.push(ch);
        pos += ch.len_utf8();
    }

    // rect_start が文字の途中: タブは落とし、制御文字はそのまま写す
    if in_indent < rect_start && pos < line.len() {
        let ch = line[pos..].chars().next().unwrap_or('\0');
        if ch == '\t' {
            pos += 1;
            in_indent += len;
        } else {
            out.push(ch);
            pos += ch.len_utf8();
            out_indent += len;
            in_indent += len;
        }
    }

    // rect_start と rect_end の間を読み飛ばす
    while let Some(ch) = line[pos..].chars().next() {
        if in_indent >= rect_end {
            break;
        }
        in_indent += char_width(ch, in_indent, tab_dist, null_subs_char);
        pos += ch.len_utf8();
    }
    let post_rect_indent = in_indent;

    // rect_start の先にテキストがなく挿入もないならここまで
    if ins_line.is_empty() && pos >= line.len() {
        let end_offset = out.len();
        return (out, end_offset);
    }

    // 行が rect_start に届かなければ詰め物をする
    if out_indent < rect_start {
        add_padding(&mut out, out_indent, rect_start, tab_dist, use_tabs);
    }
    let mut out_indent = rect_start;

    // 挿入テキストを桁0起点から rect_start へ整え直してコピーする
    if !ins_line.is_empty() {
        let retabbed = realign_tabs(ins_line, 0, rect_start, tab_dist, use_tabs, null_subs_char);
        for ch in retabbed.chars() {
            out.push(ch);
            out_indent += char_width(ch, out_indent, tab_dist, null_subs_char);
        }
    }

    // 元の行が rect_start の先へ続かなければここまで
    if pos >= line.len() {
        let end_offset = out.len();
        return (out, end_offset);
    }

    // 右端で割れた文字のはみ出し分まで詰め、残りをそのまま写す
    add_padding(&mut out, out_indent, post_rect_indent, tab_dist, use_tabs);
    let end_offset = out.len();
    out.push_str(&line[pos..]);
    (out, end_offset)
}

/// 各バイト値の出現を記録する（数えず、在否だけ）
fn histogram_characters(bytes: &[u8], hist: &mut [bool; 256]) {
    for &b in bytes {
        hist[b as usize] = true;
    }
}

/// 候補表から、ヒストグラムに現れないバイトを NUL 代替として選ぶ
fn choose_null_subs_char(hist: &[bool; 256]) -> Option<char> {
    NULL_SUBS_PREFERENCE
        .iter()
        .find(|&&b| !hist[b as usize])
        .map(|&b| b as char)
}

//! ギャップバッファ実装
//!
//! カーソル付近に空き領域（ギャップ）を保持し、連続した挿入・削除を
//! 償却 O(1) で処理するバイト列ストレージ。位置はすべて UTF-8 の
//! バイトオフセットで、検査付き操作は文字境界に乗らない位置を拒否する。

use crate::error::{buffer, BufferError};
use std::cmp::Ordering;

/// 挿入による再確保時に確保しておくギャップの大きさ
const PREFERRED_GAP_SIZE: usize = 80;

/// ギャップバッファ構造体
///
/// 論理インデックス `n` のバイトは `n < gap_start` なら `buf[n]`、
/// そうでなければ `buf[n + (gap_end - gap_start)]` に格納される。
/// `buf.len() == size + (gap_end - gap_start)` が常に成り立つ。
#[derive(Debug, Clone)]
pub struct GapBuffer {
    /// 内部バッファ（UTF-8バイト列＋ギャップ）
    buf: Vec<u8>,
    /// ギャップの開始位置
    gap_start: usize,
    /// ギャップの終了位置（排他的）
    gap_end: usize,
    /// 有効なテキストのバイト数
    size: usize,
}

fn str_from(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("gap buffer must hold valid UTF-8")
}

impl GapBuffer {
    /// 空のギャップバッファを作成
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 予約サイズ付きで空のギャップバッファを作成
    ///
    /// 最初の `reserve + PREFERRED_GAP_SIZE` バイトまでの挿入は
    /// 再確保なしで行える。
    pub fn with_capacity(reserve: usize) -> Self {
        let capacity = reserve + PREFERRED_GAP_SIZE;
        Self {
            buf: vec![0; capacity],
            gap_start: 0,
            gap_end: capacity,
            size: 0,
        }
    }

    /// 文字列からギャップバッファを作成
    pub fn from_str(text: &str) -> Self {
        let mut buffer = Self {
            buf: Vec::new(),
            gap_start: 0,
            gap_end: 0,
            size: 0,
        };
        buffer.assign(text);
        buffer
    }

    /// 有効なテキストのバイト数を取得
    pub fn len(&self) -> usize {
        self.size
    }

    /// 空かどうかを判定
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 物理容量（テキスト＋ギャップ）を取得
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// ギャップの開始位置を取得
    pub fn gap_start(&self) -> usize {
        self.gap_start
    }

    /// ギャップの終了位置（排他的）を取得
    pub fn gap_end(&self) -> usize {
        self.gap_end
    }

    /// 現在のギャップサイズを取得
    pub fn gap_size(&self) -> usize {
        self.gap_end - self.gap_start
    }

    /// 指定位置のバイトを取得（検査付き）
    pub fn byte_at(&self, pos: usize) -> buffer::Result<u8> {
        if pos >= self.size {
            return Err(BufferError::OutOfRange { position: pos, len: self.size });
        }
        Ok(self.byte_at_unchecked(pos))
    }

    /// 指定位置のバイトを取得（検査なし）
    ///
    /// 呼び出し側が `pos < len()` を保証すること。範囲外の位置では
    /// ギャップ内の不定バイトが返るか panic する。
    pub fn byte_at_unchecked(&self, pos: usize) -> u8 {
        if pos < self.gap_start {
            self.buf[pos]
        } else {
            self.buf[pos + self.gap_size()]
        }
    }

    /// 指定位置から始まる文字を取得（検査付き）
    pub fn char_at(&self, pos: usize) -> buffer::Result<char> {
        if pos >= self.size {
            return Err(BufferError::OutOfRange { position: pos, len: self.size });
        }
        if !self.is_char_boundary(pos) {
            return Err(BufferError::NotCharBoundary { position: pos });
        }
        Ok(self.char_at_boundary(pos))
    }

    /// 指定位置から始まる文字を取得（検査なし）
    ///
    /// 呼び出し側が `pos < len()` かつ文字境界であることを保証すること。
    pub(crate) fn char_at_unchecked(&self, pos: usize) -> char {
        self.char_at_boundary(pos)
    }

    /// 境界検証済みの位置から文字を復号する
    fn char_at_boundary(&self, pos: usize) -> char {
        let first = self.byte_at_unchecked(pos);
        let width = utf8_width(first);
        let mut bytes = [0u8; 4];
        for (i, slot) in bytes.iter_mut().enumerate().take(width) {
            *slot = self.byte_at_unchecked(pos + i);
        }
        str_from(&bytes[..width])
            .chars()
            .next()
            .expect("decoded width must yield one character")
    }

    /// 位置が文字境界に乗っているかを判定
    pub fn is_char_boundary(&self, pos: usize) -> bool {
        if pos == 0 || pos == self.size {
            return true;
        }
        if pos > self.size {
            return false;
        }
        (self.byte_at_unchecked(pos) & 0xC0) != 0x80
    }

    /// 指定位置に文字列を挿入
    ///
    /// テキストが現在のギャップに収まらない場合は、ギャップを挿入位置に
    /// 置き直し `len + PREFERRED_GAP_SIZE` に広げたバッファへ再確保する。
    /// 収まる場合はギャップを挿入位置まで移動してコピーする。
    pub fn insert(&mut self, pos: usize, text: &str) -> buffer::Result<()> {
        self.check_pos(pos)?;

        let length = text.len();
        if length > self.gap_size() {
            self.reallocate(pos, length + PREFERRED_GAP_SIZE);
        } else if pos != self.gap_start {
            self.move_gap(pos);
        }

        // ギャップ先頭（= pos）に新しいテキストを書き込む
        self.buf[pos..pos + length].copy_from_slice(text.as_bytes());
        self.gap_start += length;
        self.size += length;
        Ok(())
    }

    /// 指定位置に1文字を挿入
    pub fn insert_char(&mut self, pos: usize, ch: char) -> buffer::Result<()> {
        let mut encoded = [0u8; 4];
        self.insert(pos, ch.encode_utf8(&mut encoded))
    }

    /// 末尾に文字列を追加
    pub fn append(&mut self, text: &str) -> buffer::Result<()> {
        self.insert(self.size, text)
    }

    /// 指定範囲 `[start, end)` を削除し、削除位置を返す
    pub fn erase(&mut self, start: usize, end: usize) -> buffer::Result<usize> {
        self.check_range(start, end)?;
        self.delete_range(start, end);
        Ok(start)
    }

    /// 指定範囲を置換（削除してから挿入）
    pub fn replace(&mut self, start: usize, end: usize, text: &str) -> buffer::Result<()> {
        let pos = self.erase(start, end)?;
        self.insert(pos, text)
    }

    /// 全内容を破棄して文字列を設定
    ///
    /// テキスト長ぴったり＋中央に置いたギャップで再確保する。
    pub fn assign(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let length = bytes.len();
        // ギャップは中央へ。ただし多バイト文字を割らないよう境界まで戻す
        let mut gap_start = length / 2;
        while !text.is_char_boundary(gap_start) {
            gap_start -= 1;
        }
        let gap_end = gap_start + PREFERRED_GAP_SIZE;

        let mut buf = vec![0u8; length + PREFERRED_GAP_SIZE];
        buf[..gap_start].copy_from_slice(&bytes[..gap_start]);
        buf[gap_end..].copy_from_slice(&bytes[gap_start..]);

        self.buf = buf;
        self.gap_start = gap_start;
        self.gap_end = gap_end;
        self.size = length;
    }

    /// 全内容を削除
    pub fn clear(&mut self) {
        self.delete_range(0, self.size);
    }

    /// 全テキストを文字列として取得（ギャップは移動しない）
    pub fn to_string(&self) -> String {
        self.substring_unchecked(0, self.size)
    }

    /// 指定範囲のテキストを取得（検査付き、ギャップは移動しない）
    pub fn substring(&self, start: usize, end: usize) -> buffer::Result<String> {
        self.check_range(start, end)?;
        Ok(self.substring_unchecked(start, end))
    }

    /// 範囲検証済みの部分文字列コピー
    pub(crate) fn substring_unchecked(&self, start: usize, end: usize) -> String {
        let (left, right) = self.str_slices(start, end);
        let mut text = String::with_capacity(end - start);
        text.push_str(left);
        text.push_str(right);
        text
    }

    /// 指定範囲をギャップを挟んだ高々2つのスライスとして返す
    ///
    /// 範囲端とギャップ端が文字境界にあることは呼び出し側の責務。
    pub(crate) fn str_slices(&self, start: usize, end: usize) -> (&str, &str) {
        debug_assert!(start <= end && end <= self.size);
        let gap_len = self.gap_size();
        if end <= self.gap_start {
            (str_from(&self.buf[start..end]), "")
        } else if start >= self.gap_start {
            (str_from(&self.buf[start + gap_len..end + gap_len]), "")
        } else {
            (
                str_from(&self.buf[start..self.gap_start]),
                str_from(&self.buf[self.gap_end..end + gap_len]),
            )
        }
    }

    /// 全テキストをゼロコピーの連続ビューとして取得
    ///
    /// データを連続させるため、移動量が少なくなる側のバッファ端へ
    /// ギャップを寄せる。レイアウトは変わるが論理内容は変わらない。
    /// 返る借用は次の可変操作まで有効。
    pub fn to_view(&mut self) -> &str {
        let buf_len = self.size;
        let left_len = self.gap_start;
        let right_len = buf_len - left_len;

        // ギャップが両端のどちらでもなければ、近い方の端へ寄せる
        if left_len != 0 && right_len != 0 {
            let target = if left_len < right_len { 0 } else { buf_len };
            self.move_gap(target);
        }

        let start = if self.gap_start == 0 { self.gap_end } else { 0 };
        str_from(&self.buf[start..start + buf_len])
    }

    /// 指定範囲をゼロコピーの連続ビューとして取得（検査付き）
    pub fn to_view_range(&mut self, start: usize, end: usize) -> buffer::Result<&str> {
        self.check_range(start, end)?;
        Ok(&self.to_view()[start..end])
    }

    /// 指定位置のテキストとプローブ文字列を辞書順比較
    ///
    /// プローブがバッファ末尾を超える場合は `Greater` を返す。
    /// コピーを作らず、ギャップを跨ぐ場合は2分割で比較する。
    pub fn compare(&self, pos: usize, text: &str) -> Ordering {
        let probe = text.as_bytes();
        let pos_end = pos + probe.len();
        if pos_end > self.size {
            return Ordering::Greater;
        }

        let gap_len = self.gap_size();
        if pos_end <= self.gap_start {
            return self.buf[pos..pos_end].cmp(probe);
        }
        if pos >= self.gap_start {
            return self.buf[pos + gap_len..pos_end + gap_len].cmp(probe);
        }

        let part1 = self.gap_start - pos;
        match self.buf[pos..self.gap_start].cmp(&probe[..part1]) {
            Ordering::Equal => {
                self.buf[self.gap_end..self.gap_end + (probe.len() - part1)].cmp(&probe[part1..])
            }
            unequal => unequal,
        }
    }

    /// 指定位置の文字と1文字を比較
    ///
    /// `pos` は文字境界にあること。範囲外は `Greater`。
    pub fn compare_char(&self, pos: usize, ch: char) -> Ordering {
        if pos >= self.size {
            return Ordering::Greater;
        }
        self.char_at_boundary(pos).cmp(&ch)
    }

    /// 挿入位置の検査（`pos <= len` かつ文字境界）
    pub(crate) fn check_pos(&self, pos: usize) -> buffer::Result<()> {
        if pos > self.size {
            return Err(BufferError::OutOfRange { position: pos, len: self.size });
        }
        if !self.is_char_boundary(pos) {
            return Err(BufferError::NotCharBoundary { position: pos });
        }
        Ok(())
    }

    /// 範囲の検査（順序・範囲・両端の文字境界）
    pub(crate) fn check_range(&self, start: usize, end: usize) -> buffer::Result<()> {
        if start > end {
            return Err(BufferError::InvertedRange { start, end });
        }
        self.check_pos(start)?;
        self.check_pos(end)
    }

    /// ギャップを指定位置へ移動
    fn move_gap(&mut self, pos: usize) {
        let gap_len = self.gap_size();

        if pos > self.gap_start {
            // ギャップと新位置の間のデータを左へ詰める
            let span = pos - self.gap_start;
            self.buf.copy_within(self.gap_end..self.gap_end + span, self.gap_start);
        } else {
            // 新位置とギャップの間のデータを右へ退避する
            self.buf.copy_within(pos..self.gap_start, pos + gap_len);
        }

        self.gap_start = pos;
        self.gap_end = pos + gap_len;
    }

    /// ギャップを `new_gap_start` に置いたバッファへ再確保
    fn reallocate(&mut self, new_gap_start: usize, new_gap_size: usize) {
        let mut new_buf = vec![0u8; self.size + new_gap_size];
        let new_gap_end = new_gap_start + new_gap_size;

        if new_gap_start <= self.gap_start {
            new_buf[..new_gap_start].copy_from_slice(&self.buf[..new_gap_start]);
            new_buf[new_gap_end..new_gap_end + (self.gap_start - new_gap_start)]
                .copy_from_slice(&self.buf[new_gap_start..self.gap_start]);
            new_buf[new_gap_end + (self.gap_start - new_gap_start)..]
                .copy_from_slice(&self.buf[self.gap_end..]);
        } else {
            new_buf[..self.gap_start].copy_from_slice(&self.buf[..self.gap_start]);
            new_buf[self.gap_start..new_gap_start]
                .copy_from_slice(&self.buf[self.gap_end..self.gap_end + (new_gap_start - self.gap_start)]);
            new_buf[new_gap_end..]
                .copy_from_slice(&self.buf[self.gap_end + (new_gap_start - self.gap_start)..]);
        }

        self.buf = new_buf;
        self.gap_start = new_gap_start;
        self.gap_end = new_gap_end;
    }

    /// 範囲 `[start, end)` を削除しギャップに吸収させる（再確保なし）
    fn delete_range(&mut self, start: usize, end: usize) {
        // ギャップが削除範囲に隣接していなければ移動する
        if start > self.gap_start {
            self.move_gap(start);
        } else if end < self.gap_start {
            self.move_gap(end);
        }

        // ギャップを広げて削除範囲を取り込む
        self.gap_end += end - self.gap_start;
        self.gap_start = start;
        self.size -= end - start;
    }
}

/// 先頭バイトから UTF-8 シーケンス長を求める
fn utf8_width(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b < 0xE0 => 2,
        b if b < 0xF0 => 3,
        _ => 4,
    }
}

impl Default for GapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

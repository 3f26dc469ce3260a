//! 選択範囲モデル
//!
//! 一つのテキストバッファに付随する primary / secondary / highlight の
//! 3種の選択範囲を表す。矩形選択は行スパン（バイトオフセット）と
//! 表示桁の組で保持する。編集に伴う位置の付け替えもここで行う。

/// 選択範囲の読み取り結果
///
/// 依存ロジックはすべてこの一つのアクセサ経由で選択を読む。
/// 矩形選択は行単位のスライスが必要になるため、線形レンジとは
/// 別のバリアントとして区別する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSpan {
    /// 連続したバイト範囲 `[start, end)`
    Linear { start: usize, end: usize },
    /// 行スパン `[start, end]` と表示桁範囲 `[rect_start, rect_end)`
    Rectangular {
        start: usize,
        end: usize,
        rect_start: usize,
        rect_end: usize,
    },
}

/// 選択範囲
///
/// `start == end`（矩形なら `rect_start == rect_end`）の空選択も
/// 「選択あり」として保持し、`zero_width` で区別する。解除との違いは
/// `unselect` だけが `selected` を落とすことにある。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextSelection {
    selected: bool,
    rectangular: bool,
    zero_width: bool,
    start: usize,
    end: usize,
    rect_start: usize,
    rect_end: usize,
}

impl TextSelection {
    /// 線形選択を設定（start と end は自動で昇順に正規化される）
    pub fn set(&mut self, start: usize, end: usize) {
        self.selected = true;
        self.zero_width = start == end;
        self.rectangular = false;
        self.start = start.min(end);
        self.end = start.max(end);
    }

    /// 矩形選択を設定
    ///
    /// `start`/`end` は行境界に揃っていること（揃えるのはファサードの責務）。
    pub fn set_rectangular(&mut self, start: usize, end: usize, rect_start: usize, rect_end: usize) {
        self.selected = true;
        self.zero_width = rect_start == rect_end;
        self.rectangular = true;
        self.start = start;
        self.end = end;
        self.rect_start = rect_start;
        self.rect_end = rect_end;
    }

    /// 選択を解除
    pub fn unselect(&mut self) {
        self.selected = false;
        self.zero_width = false;
    }

    /// 選択中かどうか（空選択も選択中とみなす）
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// 空選択かどうか
    pub fn is_zero_width(&self) -> bool {
        self.zero_width
    }

    /// 矩形選択かどうか
    pub fn is_rectangular(&self) -> bool {
        self.rectangular
    }

    /// 選択範囲を取得（未選択なら `None`）
    pub fn position(&self) -> Option<SelectionSpan> {
        if !self.selected {
            return None;
        }
        if self.rectangular {
            Some(SelectionSpan::Rectangular {
                start: self.start,
                end: self.end,
                rect_start: self.rect_start,
                rect_end: self.rect_end,
            })
        } else {
            Some(SelectionSpan::Linear {
                start: self.start,
                end: self.end,
            })
        }
    }

    /// 幅を持つ選択として表示対象になるか
    pub(crate) fn is_visible(&self) -> bool {
        self.selected && !self.zero_width
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    pub(crate) fn rect_bounds(&self) -> (usize, usize) {
        (self.rect_start, self.rect_end)
    }

    /// バッファ編集に合わせて選択位置を付け替える
    ///
    /// 編集点より前のオフセットは変わらず、削除範囲より後ろは
    /// `n_inserted - n_deleted` だけずれる。削除範囲の内側にあった
    /// オフセットは編集点へ潰れる。編集で選択が黙って解除されることは
    /// なく、全体が削除された場合は編集点の空選択として残る。
    pub fn update_for_modification(&mut self, pos: usize, n_deleted: usize, n_inserted: usize) {
        if !self.selected || pos > self.end {
            return;
        }

        let del_end = pos + n_deleted;
        if del_end <= self.start {
            // 編集が選択より完全に前: 両端をずらす
            self.start = self.start - n_deleted + n_inserted;
            self.end = self.end - n_deleted + n_inserted;
        } else if pos <= self.start && del_end >= self.end {
            // 削除が選択を丸ごと覆う: 編集点の空選択へ潰す
            self.start = pos;
            self.end = pos;
        } else if pos <= self.start {
            // 削除が選択の先頭側に重なる
            self.start = pos;
            self.end = self.end - n_deleted + n_inserted;
        } else if del_end >= self.end {
            // 削除が選択の末尾側に重なる
            self.end = pos;
        } else {
            // 削除が選択の内側に収まる
            self.end = self.end - n_deleted + n_inserted;
        }

        self.zero_width = self.start == self.end;
    }

    /// 位置 `pos`（表示桁 `disp_index`、行頭 `line_start`）が選択内か
    pub fn contains(&self, pos: usize, line_start: usize, disp_index: usize) -> bool {
        if !self.selected {
            return false;
        }
        if self.rectangular {
            pos >= self.start
                && line_start <= self.end
                && disp_index >= self.rect_start
                && disp_index < self.rect_end
        } else {
            pos >= self.start && pos < self.end
        }
    }

    /// 矩形選択が `[range_start, range_end]` のバッファ範囲に触れるか
    pub fn range_touches_rectangle(&self, range_start: usize, range_end: usize) -> bool {
        self.selected && self.rectangular && self.end >= range_start && self.start <= range_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_normalizes_order() {
        let mut sel = TextSelection::default();
        sel.set(10, 5);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 5, end: 10 }));
    }

    #[test]
    fn empty_selection_is_still_selected() {
        let mut sel = TextSelection::default();
        sel.set(7, 7);
        assert!(sel.is_selected());
        assert!(sel.is_zero_width());
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 7, end: 7 }));

        sel.unselect();
        assert!(!sel.is_selected());
        assert_eq!(sel.position(), None);
    }

    #[test]
    fn insertion_before_selection_shifts_it() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(2, 0, 3);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 8, end: 13 }));
    }

    #[test]
    fn deletion_overlapping_head_collapses_to_edit_point() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(0, 7, 0);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 0, end: 3 }));
    }

    #[test]
    fn deletion_covering_selection_leaves_zero_width() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(3, 9, 2);
        assert!(sel.is_selected());
        assert!(sel.is_zero_width());
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 3, end: 3 }));
    }

    #[test]
    fn deletion_overlapping_tail_truncates_at_edit_point() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(7, 13, 0);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 5, end: 7 }));
    }

    #[test]
    fn deletion_inside_selection_shrinks_it() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(6, 2, 0);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 5, end: 8 }));
    }

    #[test]
    fn insertion_at_end_does_not_extend() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(10, 0, 4);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 5, end: 10 }));
    }

    #[test]
    fn edit_after_selection_is_ignored() {
        let mut sel = TextSelection::default();
        sel.set(5, 10);
        sel.update_for_modification(11, 2, 6);
        assert_eq!(sel.position(), Some(SelectionSpan::Linear { start: 5, end: 10 }));
    }

    #[test]
    fn rectangular_selection_reads_back_bounds() {
        let mut sel = TextSelection::default();
        sel.set_rectangular(0, 24, 2, 6);
        assert_eq!(
            sel.position(),
            Some(SelectionSpan::Rectangular { start: 0, end: 24, rect_start: 2, rect_end: 6 })
        );
        assert!(sel.range_touches_rectangle(20, 30));
        assert!(!sel.range_touches_rectangle(25, 30));
    }

    #[test]
    fn contains_respects_rectangle_columns() {
        let mut sel = TextSelection::default();
        sel.set_rectangular(0, 24, 2, 6);
        assert!(sel.contains(12, 10, 4));
        assert!(!sel.contains(12, 10, 6));
        assert!(!sel.contains(12, 25, 4));
    }
}

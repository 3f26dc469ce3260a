//! TextBuffer public API property tests
//!
//! These complement the module-level invariants by exercising only the exposed
//! methods so downstream integrations can rely on stable behaviour.

use lacuna::buffer::TextBuffer;
use proptest::{prelude::*, prop_oneof};
use proptest::test_runner::Config as ProptestConfig;

#[derive(Debug, Clone)]
enum Operation {
    Insert { pos: usize, text: String },
    Remove { start: usize, end: usize },
    Replace { start: usize, end: usize, text: String },
}

fn small_unicode_string() -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<char>(), 0..48)
        .prop_map(|chars| chars.into_iter().collect::<String>())
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let fragment = proptest::collection::vec(any::<char>(), 0..5)
        .prop_map(|chars| chars.into_iter().collect::<String>());

    let insert = (0u16..192u16, fragment.clone())
        .prop_map(|(pos, text)| Operation::Insert { pos: pos as usize, text });
    let remove = (0u16..192u16, 0u16..8u16)
        .prop_map(|(start, len)| Operation::Remove {
            start: start as usize,
            end: start as usize + len as usize,
        });
    let replace = (0u16..192u16, 0u16..8u16, fragment)
        .prop_map(|(start, len, text)| Operation::Replace {
            start: start as usize,
            end: start as usize + len as usize,
            text,
        });

    prop_oneof![insert, remove, replace]
}

/// 文字インデックスをバイト位置へ変換（末尾超過は末尾へ丸める）
fn char_to_byte_index(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn text_buffer_edits_match_string_model(
        initial in small_unicode_string(),
        ops in proptest::collection::vec(operation_strategy(), 0..20)
    ) {
        let mut buffer = TextBuffer::from_text(&initial);
        let mut model = initial;

        for op in ops {
            match op {
                Operation::Insert { pos, text } => {
                    let byte_pos = char_to_byte_index(&model, pos);
                    buffer.insert(byte_pos, &text).unwrap();
                    model.insert_str(byte_pos, &text);
                }
                Operation::Remove { start, end } => {
                    let start = char_to_byte_index(&model, start);
                    let end = char_to_byte_index(&model, end).max(start);
                    buffer.remove(start, end).unwrap();
                    model.replace_range(start..end, "");
                }
                Operation::Replace { start, end, text } => {
                    let start = char_to_byte_index(&model, start);
                    let end = char_to_byte_index(&model, end).max(start);
                    buffer.replace(start, end, &text).unwrap();
                    model.replace_range(start..end, &text);
                }
            }

            prop_assert_eq!(buffer.len(), model.len());
        }

        prop_assert_eq!(buffer.text(), model);
    }

    #[test]
    fn view_is_consistent_after_edits(
        initial in small_unicode_string(),
        ops in proptest::collection::vec(operation_strategy(), 0..12)
    ) {
        let mut buffer = TextBuffer::from_text(&initial);
        let mut model = initial;

        for op in ops {
            if let Operation::Insert { pos, text } = op {
                let byte_pos = char_to_byte_index(&model, pos);
                buffer.insert(byte_pos, &text).unwrap();
                model.insert_str(byte_pos, &text);
            }
        }

        // ゼロコピービューはコピー取得と常に一致する
        prop_assert_eq!(buffer.text(), model.clone());
        prop_assert_eq!(buffer.to_view(), model.as_str());
    }

    #[test]
    fn selection_tracks_edits_like_marked_positions(
        prefix in proptest::collection::vec(any::<char>(), 0..16),
        selected in proptest::collection::vec(any::<char>(), 1..16),
        suffix in proptest::collection::vec(any::<char>(), 0..16),
        inserted in proptest::collection::vec(any::<char>(), 0..8)
    ) {
        let prefix: String = prefix.into_iter().collect();
        let selected: String = selected.into_iter().collect();
        let suffix: String = suffix.into_iter().collect();
        let inserted: String = inserted.into_iter().collect();

        let text = format!("{prefix}{selected}{suffix}");
        let mut buffer = TextBuffer::from_text(&text);
        let start = prefix.len();
        let end = start + selected.len();
        buffer.select(start, end).unwrap();

        // 選択より前への挿入後も同じテキストが選択されている
        buffer.insert(0, &inserted).unwrap();
        prop_assert_eq!(buffer.selection_text(), selected);
    }
}

//! バッファ管理モジュール
//!
//! ギャップバッファ本体、選択範囲モデル、通知付きテキストバッファ
//! ファサードを提供

pub mod gap_buffer;
pub mod selection;
pub mod text_buffer;

// 公開API
pub use gap_buffer::GapBuffer;
pub use selection::{SelectionSpan, TextSelection};
pub use text_buffer::{CallbackId, ModifyEvent, PreDeleteEvent, TextBuffer};

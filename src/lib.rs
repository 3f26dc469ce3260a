//! lacuna - ギャップバッファによるテキスト格納エンジン
//!
//! 編集通知・選択範囲・タブ処理を備えたエディタ向けバッファ層の実装

// コアモジュール
pub mod error;

// データ層
pub mod buffer;
pub mod transcode;

// 入出力層
pub mod io;

// 公開API
pub use buffer::{CallbackId, GapBuffer, ModifyEvent, PreDeleteEvent, SelectionSpan, TextBuffer, TextSelection};
pub use error::{LacunaError, Result};
pub use transcode::FileFormat;

//! エラーハンドリング
//!
//! lacuna 全体で使用される統一されたエラー型を定義する。
//! バッファ操作とファイル入出力でサブシステム別のエラー列挙を持ち、
//! クレート境界では `LacunaError` に集約される。

use thiserror::Error;

/// クレート全体のエラー型
#[derive(Error, Debug, Clone)]
pub enum LacunaError {
    /// バッファ操作エラー
    #[error("buffer operation failed")]
    Buffer(#[from] BufferError),

    /// ファイル操作エラー
    #[error("file operation failed")]
    File(#[from] FileError),
}

/// バッファ操作固有のエラー
///
/// 範囲検査付きの公開操作はすべてこの型で失敗する。
/// 検査の方針は一律で、範囲外は黙って切り詰めずにエラーを返す。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("position {position} is out of range (length {len})")]
    OutOfRange { position: usize, len: usize },

    #[error("position {position} is not on a character boundary")]
    NotCharBoundary { position: usize },

    #[error("inverted range: start {start} > end {end}")]
    InvertedRange { start: usize, end: usize },

    #[error("no substitute byte available for null characters")]
    NullSubstitutionExhausted,
}

/// ファイル操作固有のエラー
#[derive(Error, Debug, Clone)]
pub enum FileError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("file is not valid UTF-8: {path}")]
    InvalidUtf8 { path: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for LacunaError {
    fn from(error: std::io::Error) -> Self {
        LacunaError::File(FileError::Io {
            message: error.to_string(),
        })
    }
}

/// プロジェクト標準のResult型
pub type Result<T> = std::result::Result<T, LacunaError>;

/// 各モジュール固有のResult型
pub mod buffer {
    pub type Result<T> = std::result::Result<T, super::BufferError>;
}

pub mod file {
    pub type Result<T> = std::result::Result<T, super::FileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_error_converts_into_crate_error() {
        let err = BufferError::OutOfRange { position: 12, len: 5 };
        let crate_err: LacunaError = err.clone().into();
        match crate_err {
            LacunaError::Buffer(inner) => assert_eq!(inner, err),
            other => panic!("expected buffer error, got {other:?}"),
        }
    }

    #[test]
    fn io_error_converts_into_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let crate_err: LacunaError = io_err.into();
        match crate_err {
            LacunaError::File(FileError::Io { message }) => {
                assert!(message.contains("disk on fire"));
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn error_messages_carry_positions() {
        let err = BufferError::OutOfRange { position: 42, len: 10 };
        assert_eq!(err.to_string(), "position 42 is out of range (length 10)");

        let err = BufferError::NotCharBoundary { position: 3 };
        assert_eq!(err.to_string(), "position 3 is not on a character boundary");
    }
}

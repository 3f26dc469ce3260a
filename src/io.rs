//! ファイル入出力
//!
//! テキストファイルの読み込みと書き出し。読み込み時に行末形式を
//! 推定して内部形式（`\n` 区切り）へ正規化し、書き出し時に元の
//! 形式へ戻す。バッファ層は行末の違いを一切意識しない。

use std::io::ErrorKind;
use std::path::Path;

use crate::error::{file, FileError};
use crate::transcode::{convert_from_dos, convert_from_mac, convert_to_dos, convert_to_mac, detect_format, FileFormat};

/// テキストファイルを読み込み、内部形式のテキストと元の行末形式を返す
///
/// 内容は UTF-8 であること。空でないのに最終行が改行で終わらない
/// 場合は補う（行単位の処理が末尾行を取りこぼさないための規約）。
pub fn read_text_file(path: &Path) -> file::Result<(String, FileFormat)> {
    let bytes = std::fs::read(path).map_err(|e| map_io_error(e, path))?;
    let raw = String::from_utf8(bytes)
        .map_err(|_| FileError::InvalidUtf8 { path: path.display().to_string() })?;

    let format = detect_format(&raw);
    let mut text = match format {
        FileFormat::Unix => raw,
        FileFormat::Dos => {
            let (converted, pending) = convert_from_dos(&raw);
            // ファイル全体の一括変換では持ち越しは末尾の孤立 \r
            match pending {
                Some(cr) => {
                    let mut converted = converted;
                    converted.push(cr);
                    converted
                }
                None => converted,
            }
        }
        FileFormat::Mac => convert_from_mac(&raw),
    };

    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }

    Ok((text, format))
}

/// 内部形式のテキストを指定の行末形式でファイルへ書き出す
pub fn write_text_file(path: &Path, text: &str, format: FileFormat) -> file::Result<()> {
    let converted;
    let out: &str = match format {
        FileFormat::Unix => text,
        FileFormat::Dos => {
            converted = convert_to_dos(text);
            &converted
        }
        FileFormat::Mac => {
            converted = convert_to_mac(text);
            &converted
        }
    };

    std::fs::write(path, out).map_err(|e| map_io_error(e, path))
}

fn map_io_error(error: std::io::Error, path: &Path) -> FileError {
    let path = path.display().to_string();
    match error.kind() {
        ErrorKind::NotFound => FileError::NotFound { path },
        ErrorKind::PermissionDenied => FileError::PermissionDenied { path },
        _ => FileError::Io { message: error.to_string() },
    }
}

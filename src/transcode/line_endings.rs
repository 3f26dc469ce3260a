//! 行末コードの判定と変換
//!
//! バッファ内部の行区切りは常に `\n` とし、DOS（`\r\n`）と
//! Mac（`\r`）への変換は取り込み・書き出しの境界だけで行う。

/// 判定時にサンプリングする行数の上限
const FORMAT_SAMPLE_LINES: usize = 5;
/// 判定時にサンプリングするバイト数の上限
const FORMAT_SAMPLE_CHARS: usize = 2000;

/// テキストファイルの行末形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `\n` 区切り
    Unix,
    /// `\r\n` 区切り
    Dos,
    /// `\r` 区切り
    Mac,
}

/// 行末形式を推定する
///
/// 先頭から最大 `FORMAT_SAMPLE_LINES` 行または
/// `FORMAT_SAMPLE_CHARS` バイトを走査する。`\r` を伴わない `\n` を
/// ひとつでも見つけたら直ちに Unix と判定する（反例ひとつで確定する
/// 非対称な規則）。対になった改行だけが規定行数まで続けば DOS。
/// サンプル中に `\n` がなく `\r` だけがあれば Mac。どちらもなければ
/// Unix。曖昧なまま返ることはない。
pub fn detect_format(text: &str) -> FileFormat {
    let bytes = text.as_bytes();
    let mut n_newlines = 0;
    let mut n_returns = 0;

    for (i, &b) in bytes.iter().take(FORMAT_SAMPLE_CHARS).enumerate() {
        if b == b'\n' {
            n_newlines += 1;
            if i == 0 || bytes[i - 1] != b'\r' {
                return FileFormat::Unix;
            }
            if n_newlines >= FORMAT_SAMPLE_LINES {
                return FileFormat::Dos;
            }
        } else if b == b'\r' {
            n_returns += 1;
        }
    }

    if n_newlines > 0 {
        return FileFormat::Dos;
    }
    if n_returns > 0 {
        return FileFormat::Mac;
    }
    FileFormat::Unix
}

/// DOS 形式のテキストを内部形式（`\n` 区切り）へ変換する
///
/// `\n` の直前の `\r` を取り除く。対を成さない `\r` はそのまま残す。
/// 末尾が単独の `\r` で終わる場合、それはチャンク境界で分断された
/// `\r\n` の前半かもしれないため出力に含めず、2番目の戻り値として
/// 返す。チャンク処理する呼び出し側は次のチャンクの先頭に繋げること。
/// ファイル全体を一括変換する場合は末尾に戻せばよい。
pub fn convert_from_dos(text: &str) -> (String, Option<char>) {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\r' {
            match chars.peek() {
                // 対の前半なので捨て、次の周回で `\n` を写す
                Some('\n') => continue,
                Some(_) => {}
                None => return (out, Some('\r')),
            }
        }
        out.push(ch);
    }

    (out, None)
}

/// 内部形式のテキストを DOS 形式へ変換する
pub fn convert_to_dos(text: &str) -> String {
    let extra = text.bytes().filter(|&b| b == b'\n').count();
    let mut out = String::with_capacity(text.len() + extra);

    for ch in text.chars() {
        if ch == '\n' {
            out.push('\r');
        }
        out.push(ch);
    }

    out
}

/// Mac 形式のテキストを内部形式へ変換する
pub fn convert_from_mac(text: &str) -> String {
    text.replace('\r', "\n")
}

/// 内部形式のテキストを Mac 形式へ変換する
pub fn convert_to_mac(text: &str) -> String {
    text.replace('\n', "\r")
}

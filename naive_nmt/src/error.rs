use std::path::PathBuf;
use thiserror::Error;

/// セットアップ時に発生するエラー
///
/// どれも致命的で、呼び出し側はそのまま処理を中断する想定。
#[derive(Debug, Error)]
pub enum NmtError {
    /// 設定の欠落・矛盾（share_vocabでサイズ不一致、次元不一致など）
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 語彙ファイル・埋め込みファイルの形式不正
    #[error("形式エラー: {}:{line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// ファイルの読み書き失敗
    #[error("入出力エラー: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// バッチの形状不正（行ごとに長さが違う等）
    #[error("形状エラー: {0}")]
    Shape(String),
}

impl NmtError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NmtError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        NmtError::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NmtError>;

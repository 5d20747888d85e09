use crate::config::{EOS, SOS, UNK};
use crate::error::{NmtError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 特殊トークンの文字列
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub unk: String,
    pub sos: String,
    pub eos: String,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            unk: UNK.to_string(),
            sos: SOS.to_string(),
            eos: EOS.to_string(),
        }
    }
}

impl SpecialTokens {
    /// 挿入順（unk, sos, eos）
    fn in_order(&self) -> [&str; 3] {
        [&self.unk, &self.sos, &self.eos]
    }
}

/// 語彙（1行1トークン、行位置 = ID）
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub token_to_id: HashMap<String, usize>,
    pub id_to_token: Vec<String>,
    pub vocab_size: usize,
    pub unk_id: usize,
    pub sos_id: Option<usize>,
    pub eos_id: Option<usize>,
    /// 特殊トークンを補った数（0〜3）
    pub inserted: usize,
    pub special_tokens: SpecialTokens,
}

impl Vocabulary {
    /// 語彙ファイルを読み込む
    ///
    /// `check_special_token` が有効なら、足りない特殊トークンを unk, sos, eos の順で先頭に補う。
    /// 語彙サイズはファイルの行数ではなく、戻り値の `vocab_size` を使うこと。
    pub fn load(
        path: impl AsRef<Path>,
        special_tokens: &SpecialTokens,
        check_special_token: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NmtError::Configuration(format!(
                "語彙ファイルが存在しません: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| NmtError::io(path, e))?;

        let tokens = collect_tokens(content.lines(), path)?;

        if tokens.is_empty() {
            return Err(NmtError::Configuration(format!(
                "語彙ファイルが空です: {}",
                path.display()
            )));
        }

        let vocab = Self::assemble(tokens, special_tokens, check_special_token);

        info!(
            path = %path.display(),
            vocab_size = vocab.vocab_size,
            inserted = vocab.inserted,
            "語彙を読み込み"
        );

        Ok(vocab)
    }

    /// メモリ上のトークン列から語彙を構築（ルールは `load` と同じ）
    ///
    /// 重複時の形式エラーの行番号は入力中の位置（1始まり）。
    pub fn from_tokens<I, S>(
        tokens: I,
        special_tokens: &SpecialTokens,
        check_special_token: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = collect_tokens(tokens, Path::new(IN_MEMORY))?;

        if list.is_empty() {
            return Err(NmtError::Configuration("語彙が空です".to_string()));
        }

        Ok(Self::assemble(list, special_tokens, check_special_token))
    }

    fn assemble(tokens: Vec<String>, special_tokens: &SpecialTokens, check: bool) -> Self {
        let mut words = Vec::with_capacity(tokens.len() + 3);

        // 足りない特殊トークンを固定順で先頭に追加
        if check {
            for special in special_tokens.in_order() {
                if !tokens.iter().any(|t| t == special) {
                    debug!(token = special, "特殊トークンを補完");
                    words.push(special.to_string());
                }
            }
        }
        let inserted = words.len();
        words.extend(tokens);

        // token_to_id の構築
        let mut token_to_id = HashMap::with_capacity(words.len());
        for (id, word) in words.iter().enumerate() {
            token_to_id.insert(word.clone(), id);
        }

        let unk_id = token_to_id.get(&special_tokens.unk).copied().unwrap_or(0);
        let sos_id = token_to_id.get(&special_tokens.sos).copied();
        let eos_id = token_to_id.get(&special_tokens.eos).copied();
        let vocab_size = words.len();

        Vocabulary {
            token_to_id,
            id_to_token: words,
            vocab_size,
            unk_id,
            sos_id,
            eos_id,
            inserted,
            special_tokens: special_tokens.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.vocab_size
    }

    pub fn is_empty(&self) -> bool {
        self.vocab_size == 0
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    /// 語彙外のトークンはunkのIDになる
    pub fn id_or_unk(&self, token: &str) -> usize {
        self.id(token).unwrap_or(self.unk_id)
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(String::as_str)
    }

    /// トークン列をIDに変換
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<i32> {
        tokens
            .iter()
            .map(|t| self.id_or_unk(t.as_ref()) as i32)
            .collect()
    }

    /// IDをスペース区切りの文に変換（sos/eosと範囲外のIDは出力しない）
    pub fn decode(&self, token_ids: &[i32]) -> String {
        token_ids
            .iter()
            .filter_map(|&id| {
                if id < 0 {
                    return None;
                }
                let id = id as usize;
                if Some(id) == self.sos_id || Some(id) == self.eos_id {
                    return None;
                }
                self.token(id)
            })
            .collect::<Vec<&str>>()
            .join(" ")
    }

    /// 1行1トークンで書き出す
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| NmtError::io(parent, e))?;
        }

        let mut content = self.id_to_token.join("\n");
        content.push('\n');
        fs::write(path, content).map_err(|e| NmtError::io(path, e))?;

        info!(path = %path.display(), "語彙を保存");
        Ok(path.to_path_buf())
    }
}

/// エラーメッセージ上のメモリ入力の名前
const IN_MEMORY: &str = "<memory>";

/// 各行を前後の空白を除いて集める（空行は飛ばし、重複は形式エラー）
fn collect_tokens<I, S>(lines: I, origin: &Path) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tokens = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, line) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let token = line.as_ref().trim();

        if token.is_empty() {
            continue;
        }

        if let Some(first) = seen.insert(token.to_string(), line_no) {
            return Err(NmtError::format(
                origin,
                line_no,
                format!("トークン '{}' が重複しています（最初の出現: {}行目）", token, first),
            ));
        }
        tokens.push(token.to_string());
    }

    Ok(tokens)
}

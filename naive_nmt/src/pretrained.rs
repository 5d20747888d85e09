use crate::error::{NmtError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Glove形式の事前学習済み埋め込み（トークン → ベクトル）
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    vectors: HashMap<String, Vec<f32>>,
    dim: usize,
}

impl EmbeddingTable {
    /// 埋め込みファイルを読み込む
    ///
    /// 形式: `<token> <float> <float> ...`（空白区切り。タブや連続したスペースも可）
    /// 先頭行が `<語数> <次元>` の2整数ならヘッダとして読み飛ばす。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| NmtError::io(path, e))?;
        let table = Self::from_reader(BufReader::new(file), path)?;

        info!(
            path = %path.display(),
            tokens = table.len(),
            dim = table.dim,
            "事前学習済み埋め込みを読み込み"
        );

        Ok(table)
    }

    /// 任意のリーダーから読み込む（`origin` はエラーメッセージ用）
    pub fn from_reader<R: BufRead>(reader: R, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        let mut dim: Option<usize> = None;
        let mut header_dim: Option<usize> = None;
        let mut first_line = true;

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| NmtError::io(origin, e))?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let token = fields.next().unwrap_or_default();

            if first_line {
                first_line = false;
                if let Some(declared) = parse_header(line) {
                    header_dim = Some(declared);
                    continue;
                }
            }

            let values = fields
                .map(|v| {
                    v.parse::<f32>().map_err(|_| {
                        NmtError::format(origin, line_no, format!("数値として解釈できません: '{}'", v))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            if values.is_empty() {
                return Err(NmtError::format(
                    origin,
                    line_no,
                    format!("トークン '{}' にベクトルがありません", token),
                ));
            }

            // 次元は最初の行で決まる
            let expected = *dim.get_or_insert(values.len());
            if values.len() != expected {
                return Err(NmtError::format(
                    origin,
                    line_no,
                    format!(
                        "ベクトル長が不一致です: 期待値 {}, 実際 {}",
                        expected,
                        values.len()
                    ),
                ));
            }

            // 同じトークンは後勝ち
            if vectors.insert(token.to_string(), values).is_some() {
                warn!(token, line = line_no, "トークンが重複（後の行で上書き）");
            }
        }

        let dim = dim.ok_or_else(|| NmtError::format(origin, 0, "埋め込みファイルが空です"))?;

        if let Some(declared) = header_dim {
            if declared != dim {
                return Err(NmtError::format(
                    origin,
                    1,
                    format!("ヘッダの次元 {} と実際の次元 {} が一致しません", declared, dim),
                ));
            }
        }

        Ok(Self { vectors, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(Vec::as_slice)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.vectors.contains_key(token)
    }
}

/// `<語数> <次元>` 形式のヘッダなら次元を返す
fn parse_header(line: &str) -> Option<usize> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 2 {
        return None;
    }
    let _count: usize = fields[0].parse().ok()?;
    fields[1].parse().ok()
}

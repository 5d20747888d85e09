use crate::error::{NmtError, Result};
use crate::pretrained::EmbeddingTable;
use crate::vocabulary::Vocabulary;
use burn::prelude::*;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// 事前学習済みベクトルが無い行の乱数初期化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomInit {
    pub seed: u64,
    /// 一様分布の範囲 [-scale, scale)
    pub scale: f32,
}

impl RandomInit {
    pub fn new(seed: u64, scale: f32) -> Self {
        Self { seed, scale }
    }
}

/// 埋め込み行列 [vocab_size, dim]（行 i = 語彙ID i）
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
    pretrained_rows: usize,
}

impl EmbeddingMatrix {
    /// 語彙と事前学習済みテーブルから行列を構築
    ///
    /// `dim` はテーブルが無い場合は必須、ある場合はテーブルの次元と一致する必要がある。
    /// テーブルに無いトークンの行は `init` のシードから決定的に生成される。
    pub fn build(
        vocab: &Vocabulary,
        table: Option<&EmbeddingTable>,
        dim: Option<usize>,
        init: &RandomInit,
    ) -> Result<Self> {
        let dim = match (table, dim) {
            (Some(table), Some(dim)) if table.dim() != dim => {
                return Err(NmtError::Configuration(format!(
                    "埋め込み次元 {} が事前学習済みファイルの次元 {} と一致しません",
                    dim,
                    table.dim()
                )));
            }
            (Some(table), _) => table.dim(),
            (None, Some(dim)) => dim,
            (None, None) => {
                return Err(NmtError::Configuration(
                    "事前学習済みファイルが無い場合は埋め込み次元の指定が必要です".to_string(),
                ));
            }
        };

        if dim == 0 {
            return Err(NmtError::Configuration(
                "埋め込み次元は1以上である必要があります".to_string(),
            ));
        }
        if !(init.scale.is_finite() && init.scale > 0.0) {
            return Err(NmtError::Configuration(format!(
                "初期化の範囲が不正です: {}",
                init.scale
            )));
        }

        let rows = vocab.vocab_size;
        let mut rng = ChaCha8Rng::seed_from_u64(init.seed);
        let uniform = Uniform::new(-init.scale, init.scale);

        let mut data = Vec::with_capacity(rows * dim);
        let mut pretrained_rows = 0;

        for token in &vocab.id_to_token {
            match table.and_then(|t| t.get(token)) {
                Some(vector) => {
                    data.extend_from_slice(vector);
                    pretrained_rows += 1;
                }
                None => data.extend((0..dim).map(|_| uniform.sample(&mut rng))),
            }
        }

        info!(
            rows,
            dim,
            pretrained_rows,
            random_rows = rows - pretrained_rows,
            "埋め込み行列を構築"
        );

        Ok(Self {
            data,
            rows,
            dim,
            pretrained_rows,
        })
    }

    /// [rows, dim]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.dim]
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 事前学習済みベクトルをコピーした行数
    pub fn pretrained_rows(&self) -> usize {
        self.pretrained_rows
    }

    pub fn row(&self, id: usize) -> Option<&[f32]> {
        if id >= self.rows {
            return None;
        }
        Some(&self.data[id * self.dim..(id + 1) * self.dim])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Tensorに変換
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(self.data.as_slice(), device).reshape([self.rows, self.dim])
    }
}

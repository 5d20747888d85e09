use crate::config::BUCKET_WIDTH_UNBOUNDED;
use crate::error::{NmtError, Result};
use crate::hparams::{with_suffix, HParams};
use crate::vocabulary::Vocabulary;
use burn::prelude::*;
use burn::tensor::Int;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetMode {
    Train,
    Eval,
}

/// 1文対（ID列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub source: Vec<i32>,
    /// [SOS, word1, ..., wordN]
    pub target_input: Vec<i32>,
    /// [word1, ..., wordN, EOS]
    pub target_output: Vec<i32>,
}

/// パディング済みのバッチ（ソースはソース語彙、ターゲットはターゲット語彙のeosで埋める）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub source: Vec<Vec<i32>>,
    pub target_input: Vec<Vec<i32>>,
    pub target_output: Vec<Vec<i32>>,
    pub source_lengths: Vec<usize>,
    pub target_lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// [batch, src_time]
    pub fn source_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        to_int_tensor(&self.source, device)
    }

    /// [batch, tgt_time]
    pub fn target_input_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        to_int_tensor(&self.target_input, device)
    }

    /// [batch, tgt_time]
    pub fn target_output_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        to_int_tensor(&self.target_output, device)
    }
}

fn to_int_tensor<B: Backend>(rows: &[Vec<i32>], device: &B::Device) -> Tensor<B, 2, Int> {
    let batch_size = rows.len();
    let time_steps = rows.first().map(Vec::len).unwrap_or(0);
    let flattened: Vec<i32> = rows.iter().flatten().copied().collect();

    Tensor::<B, 1, Int>::from_data(flattened.as_slice(), device).reshape([batch_size, time_steps])
}

/// 対訳コーパス（`{prefix}.{src}` と `{prefix}.{tgt}` の行対応）
#[derive(Debug, Clone)]
pub struct ParallelDataset {
    pub examples: Vec<Example>,
    pub mode: DatasetMode,
    /// ソース行のパディング（ソース語彙のeos、無ければunk）
    src_pad_id: i32,
    /// ターゲット行のパディング（ターゲット語彙のeos）
    tgt_pad_id: i32,
    batch_size: usize,
    num_buckets: usize,
    bucket_width: usize,
    seed: u64,
}

impl ParallelDataset {
    pub fn load(
        hparams: &HParams,
        src_vocab: &Vocabulary,
        tgt_vocab: &Vocabulary,
        mode: DatasetMode,
    ) -> Result<Self> {
        let options = &hparams.options;
        let (prefix, name) = match mode {
            DatasetMode::Train => (options.train_prefix.as_ref(), "train_prefix"),
            DatasetMode::Eval => (options.dev_prefix.as_ref(), "dev_prefix"),
        };
        let prefix = prefix
            .ok_or_else(|| NmtError::Configuration(format!("{}が指定されていません", name)))?;

        let (src, tgt) = match (&options.src, &options.tgt) {
            (Some(src), Some(tgt)) => (src, tgt),
            _ => {
                return Err(NmtError::Configuration(
                    "src/tgtが指定されていません".to_string(),
                ))
            }
        };

        let src_path = with_suffix(prefix, src);
        let tgt_path = with_suffix(prefix, tgt);
        let src_lines = read_lines(&src_path)?;
        let tgt_lines = read_lines(&tgt_path)?;

        if src_lines.len() != tgt_lines.len() {
            return Err(NmtError::format(
                &tgt_path,
                tgt_lines.len().min(src_lines.len()) + 1,
                format!(
                    "ソースとターゲットの行数が一致しません: {} 行と {} 行",
                    src_lines.len(),
                    tgt_lines.len()
                ),
            ));
        }

        let sos_id = special_id(tgt_vocab.sos_id, &tgt_vocab.special_tokens.sos)?;
        let eos_id = special_id(tgt_vocab.eos_id, &tgt_vocab.special_tokens.eos)?;
        let src_pad_id = src_vocab.eos_id.unwrap_or(src_vocab.unk_id) as i32;

        let skip = if mode == DatasetMode::Train {
            options.skip_count
        } else {
            0
        };
        let limit = if mode == DatasetMode::Train && options.max_train > 0 {
            options.max_train
        } else {
            usize::MAX
        };

        let mut examples = Vec::new();
        let mut dropped = 0;

        for (src_line, tgt_line) in src_lines.iter().zip(tgt_lines.iter()).skip(skip).take(limit) {
            let src_tokens: Vec<&str> = src_line.split_whitespace().collect();
            let tgt_tokens: Vec<&str> = tgt_line.split_whitespace().collect();

            // 空の文を含む対は捨てる
            if src_tokens.is_empty() || tgt_tokens.is_empty() {
                dropped += 1;
                continue;
            }

            let mut source = src_vocab.encode(&src_tokens);
            truncate(&mut source, options.src_max_len);

            let mut target = tgt_vocab.encode(&tgt_tokens);
            truncate(&mut target, options.tgt_max_len);

            let mut target_input = Vec::with_capacity(target.len() + 1);
            target_input.push(sos_id);
            target_input.extend(&target);

            let mut target_output = target;
            target_output.push(eos_id);

            examples.push(Example {
                source,
                target_input,
                target_output,
            });
        }

        if dropped > 0 {
            warn!(dropped, "空の文を含む対を除外");
        }

        let bucket_width = if options.src_max_len > 0 {
            options.src_max_len.div_ceil(options.num_buckets.max(1))
        } else {
            BUCKET_WIDTH_UNBOUNDED
        };

        info!(
            source = %src_path.display(),
            examples = examples.len(),
            ?mode,
            "対訳データを読み込み"
        );

        Ok(Self {
            examples,
            mode,
            src_pad_id,
            tgt_pad_id: eos_id,
            batch_size: options.batch_size,
            num_buckets: options.num_buckets.max(1),
            bucket_width,
            seed: hparams.embedding_seed,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// 長さでバケット分けしたバッチを生成（ターゲットはバッチ内最大長までEOSでパディング）
    ///
    /// 訓練モードでは例とバッチの順序をシードでシャッフルする。
    pub fn batches(&self) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        if self.mode == DatasetMode::Train {
            order.shuffle(&mut rng);
        }

        // バケットIDは昇順に並べる
        let mut buckets: BTreeMap<usize, Vec<&Example>> = BTreeMap::new();
        for index in order {
            let example = &self.examples[index];
            buckets
                .entry(self.bucket_id(example))
                .or_default()
                .push(example);
        }

        let mut batches: Vec<Batch> = buckets
            .values()
            .flat_map(|bucket| bucket.chunks(self.batch_size.max(1)))
            .map(|chunk| self.pad_batch(chunk))
            .collect();

        if self.mode == DatasetMode::Train {
            batches.shuffle(&mut rng);
        }

        batches
    }

    fn bucket_id(&self, example: &Example) -> usize {
        let length = example.source.len().max(example.target_output.len() - 1);
        (length / self.bucket_width).min(self.num_buckets - 1)
    }

    fn pad_batch(&self, chunk: &[&Example]) -> Batch {
        // バッチ内の最大長を取得
        let max_source_len = chunk.iter().map(|e| e.source.len()).max().unwrap_or(0);
        let max_target_len = chunk.iter().map(|e| e.target_input.len()).max().unwrap_or(0);

        let pad = |row: &[i32], len: usize, pad_id: i32| {
            let mut padded = row.to_vec();
            padded.resize(len, pad_id);
            padded
        };

        Batch {
            source: chunk
                .iter()
                .map(|e| pad(&e.source, max_source_len, self.src_pad_id))
                .collect(),
            target_input: chunk
                .iter()
                .map(|e| pad(&e.target_input, max_target_len, self.tgt_pad_id))
                .collect(),
            target_output: chunk
                .iter()
                .map(|e| pad(&e.target_output, max_target_len, self.tgt_pad_id))
                .collect(),
            source_lengths: chunk.iter().map(|e| e.source.len()).collect(),
            target_lengths: chunk.iter().map(|e| e.target_input.len()).collect(),
        }
    }
}

/// 0は無制限
fn truncate(ids: &mut Vec<i32>, max_len: usize) {
    if max_len > 0 {
        ids.truncate(max_len);
    }
}

fn special_id(id: Option<usize>, token: &str) -> Result<i32> {
    id.map(|id| id as i32).ok_or_else(|| {
        NmtError::Configuration(format!("ターゲット語彙に特殊トークン '{}' がありません", token))
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| NmtError::io(path, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

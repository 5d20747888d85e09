use crate::embedding_matrix::{EmbeddingMatrix, RandomInit};
// Configのderiveが裸の `Result<_, E>` を展開するため、別名で取り込む
use crate::error::{NmtError, Result as NmtResult};
use crate::hparams::HParams;
use crate::pretrained::EmbeddingTable;
use crate::vocabulary::{SpecialTokens, Vocabulary};
use burn::prelude::*;
use burn::tensor::{ElementConversion, Int};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 埋め込みモジュールの設定
#[derive(Config, Debug)]
pub struct EmbeddingConfig {
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    pub src_vocab_file: PathBuf,
    pub tgt_vocab_file: PathBuf,
    pub src_embedding_size: usize,
    pub tgt_embedding_size: usize,
    /// Glove形式の事前学習済み埋め込み（ソース）
    pub src_embedding_file: Option<PathBuf>,
    /// Glove形式の事前学習済み埋め込み（ターゲット）
    pub tgt_embedding_file: Option<PathBuf>,
    /// ソースとターゲットで1つの埋め込み行列を共有する
    #[config(default = false)]
    pub share_vocab: bool,
    #[config(default = true)]
    pub check_special_token: bool,
    #[config(default = "SpecialTokens::default()")]
    pub special_tokens: SpecialTokens,
    /// 乱数初期化のシード（ターゲットは seed + 1 を使う）
    #[config(default = 0)]
    pub seed: u64,
    #[config(default = 0.1)]
    pub init_weight: f32,
}

impl EmbeddingConfig {
    /// ハイパーパラメータから設定を作る
    pub fn from_hparams(hparams: &HParams) -> Self {
        Self::new(
            hparams.source_vocab_size,
            hparams.target_vocab_size,
            hparams.source_vocab_file.clone(),
            hparams.target_vocab_file.clone(),
            hparams.source_embedding_size,
            hparams.target_embedding_size,
        )
        .with_src_embedding_file(hparams.source_embed_file.clone())
        .with_tgt_embedding_file(hparams.target_embed_file.clone())
        .with_share_vocab(hparams.options.share_vocab)
        .with_check_special_token(hparams.options.check_special_token)
        .with_special_tokens(hparams.special_tokens())
        .with_seed(hparams.embedding_seed)
        .with_init_weight(hparams.options.init_weight)
    }

    /// 埋め込みモジュールを構築
    pub fn init<B: Backend>(&self, device: &B::Device) -> NmtResult<Seq2SeqEmbedding<B>> {
        Seq2SeqEmbedding::new(self, device)
    }
}

/// Encoder/Decoder入力用の埋め込み
///
/// 構築後は読み取り専用。`share_vocab` のときは同じ行列を両方のルックアップで使う。
#[derive(Debug, Clone)]
pub struct Seq2SeqEmbedding<B: Backend> {
    source_vocab: Arc<Vocabulary>,
    target_vocab: Arc<Vocabulary>,
    source_weights: Tensor<B, 2>,
    target_weights: Tensor<B, 2>,
    shared: bool,
    device: B::Device,
}

impl<B: Backend> Seq2SeqEmbedding<B> {
    pub fn new(config: &EmbeddingConfig, device: &B::Device) -> NmtResult<Self> {
        let init = RandomInit::new(config.seed, config.init_weight);

        if config.share_vocab {
            if config.src_vocab_size != config.tgt_vocab_size {
                return Err(NmtError::Configuration(format!(
                    "share_vocabでは語彙サイズが一致する必要があります: ソース {}, ターゲット {}",
                    config.src_vocab_size, config.tgt_vocab_size
                )));
            }
            if config.src_embedding_size != config.tgt_embedding_size {
                return Err(NmtError::Configuration(format!(
                    "share_vocabでは埋め込み次元が一致する必要があります: ソース {}, ターゲット {}",
                    config.src_embedding_size, config.tgt_embedding_size
                )));
            }

            let source_vocab = load_vocab(
                &config.src_vocab_file,
                config.src_vocab_size,
                &config.special_tokens,
                config.check_special_token,
            )?;

            // 別ファイルを指定された場合は中身が同じであること
            if config.tgt_vocab_file != config.src_vocab_file {
                let target_vocab = load_vocab(
                    &config.tgt_vocab_file,
                    config.tgt_vocab_size,
                    &config.special_tokens,
                    config.check_special_token,
                )?;
                if target_vocab.id_to_token != source_vocab.id_to_token {
                    return Err(NmtError::Configuration(format!(
                        "share_vocabでは語彙が同一である必要があります: {} と {}",
                        config.src_vocab_file.display(),
                        config.tgt_vocab_file.display()
                    )));
                }
            }

            let table = load_table(config.src_embedding_file.as_ref())?;
            let matrix = EmbeddingMatrix::build(
                &source_vocab,
                table.as_ref(),
                Some(config.src_embedding_size),
                &init,
            )?;
            let weights = matrix.to_tensor::<B>(device);
            let vocab = Arc::new(source_vocab);

            info!(
                vocab_size = vocab.vocab_size,
                dim = matrix.dim(),
                "共有埋め込みを構築"
            );

            return Ok(Self {
                source_vocab: Arc::clone(&vocab),
                target_vocab: vocab,
                source_weights: weights.clone(),
                target_weights: weights,
                shared: true,
                device: device.clone(),
            });
        }

        let source_vocab = load_vocab(
            &config.src_vocab_file,
            config.src_vocab_size,
            &config.special_tokens,
            config.check_special_token,
        )?;
        let target_vocab = load_vocab(
            &config.tgt_vocab_file,
            config.tgt_vocab_size,
            &config.special_tokens,
            config.check_special_token,
        )?;

        // ソースとターゲットは独立に構築
        let source_table = load_table(config.src_embedding_file.as_ref())?;
        let source_matrix = EmbeddingMatrix::build(
            &source_vocab,
            source_table.as_ref(),
            Some(config.src_embedding_size),
            &init,
        )?;

        let target_init = RandomInit::new(config.seed.wrapping_add(1), config.init_weight);
        let target_table = load_table(config.tgt_embedding_file.as_ref())?;
        let target_matrix = EmbeddingMatrix::build(
            &target_vocab,
            target_table.as_ref(),
            Some(config.tgt_embedding_size),
            &target_init,
        )?;

        info!(
            src_shape = ?source_matrix.shape(),
            tgt_shape = ?target_matrix.shape(),
            "ソース・ターゲット埋め込みを構築"
        );

        Ok(Self {
            source_vocab: Arc::new(source_vocab),
            target_vocab: Arc::new(target_vocab),
            source_weights: source_matrix.to_tensor::<B>(device),
            target_weights: target_matrix.to_tensor::<B>(device),
            shared: false,
            device: device.clone(),
        })
    }

    /// Encoder入力: [batch, time] のトークン → [batch, time, src_embedding_size]
    ///
    /// 語彙外のトークンはunkの行になる。
    pub fn encoder_embedding_input<S: AsRef<str>>(&self, token_batch: &[Vec<S>]) -> NmtResult<Tensor<B, 3>> {
        self.embed_tokens(&self.source_vocab, &self.source_weights, token_batch)
    }

    /// Decoder入力: [batch, time] のトークン → [batch, time, tgt_embedding_size]
    pub fn decoder_embedding_input<S: AsRef<str>>(&self, token_batch: &[Vec<S>]) -> NmtResult<Tensor<B, 3>> {
        self.embed_tokens(&self.target_vocab, &self.target_weights, token_batch)
    }

    /// ID化済みのバッチ [batch, time] をソース行列で引く
    ///
    /// IDは `[0, ソース語彙サイズ)` の範囲にある必要がある。範囲外は形状エラー。
    pub fn encoder_embedding_lookup(&self, ids: Tensor<B, 2, Int>) -> NmtResult<Tensor<B, 3>> {
        check_id_range(&ids, self.source_vocab.vocab_size, "ソース")?;
        Ok(self.lookup(&self.source_weights, ids))
    }

    /// ID化済みのバッチ [batch, time] をターゲット行列で引く
    pub fn decoder_embedding_lookup(&self, ids: Tensor<B, 2, Int>) -> NmtResult<Tensor<B, 3>> {
        check_id_range(&ids, self.target_vocab.vocab_size, "ターゲット")?;
        Ok(self.lookup(&self.target_weights, ids))
    }

    pub fn source_vocab(&self) -> &Vocabulary {
        &self.source_vocab
    }

    pub fn target_vocab(&self) -> &Vocabulary {
        &self.target_vocab
    }

    pub fn source_weights(&self) -> &Tensor<B, 2> {
        &self.source_weights
    }

    pub fn target_weights(&self) -> &Tensor<B, 2> {
        &self.target_weights
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn source_embedding_size(&self) -> usize {
        self.source_weights.dims()[1]
    }

    pub fn target_embedding_size(&self) -> usize {
        self.target_weights.dims()[1]
    }

    /// トークンのバッチを埋め込む（行ごとの長さは揃っている必要がある）
    fn embed_tokens<S: AsRef<str>>(
        &self,
        vocab: &Vocabulary,
        weights: &Tensor<B, 2>,
        token_batch: &[Vec<S>],
    ) -> NmtResult<Tensor<B, 3>> {
        let batch_size = token_batch.len();
        let time_steps = token_batch.first().map(Vec::len).unwrap_or(0);

        if let Some((row, tokens)) = token_batch
            .iter()
            .enumerate()
            .find(|(_, tokens)| tokens.len() != time_steps)
        {
            return Err(NmtError::Shape(format!(
                "バッチの{}行目の長さ {} が先頭行の長さ {} と一致しません",
                row,
                tokens.len(),
                time_steps
            )));
        }

        if batch_size == 0 || time_steps == 0 {
            let embedding_size = weights.dims()[1];
            return Ok(Tensor::zeros([batch_size, time_steps, embedding_size], &self.device));
        }

        let flattened: Vec<i32> = token_batch
            .iter()
            .flat_map(|tokens| vocab.encode(tokens))
            .collect();
        let ids = Tensor::<B, 1, Int>::from_data(flattened.as_slice(), &self.device)
            .reshape([batch_size, time_steps]);

        Ok(self.lookup(weights, ids))
    }

    fn lookup(&self, weights: &Tensor<B, 2>, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, time_steps] = ids.dims();
        let embedding_size = weights.dims()[1];

        // 空バッチは形状だけ保つ
        if batch_size == 0 || time_steps == 0 {
            return Tensor::zeros([batch_size, time_steps, embedding_size], &self.device);
        }

        burn::tensor::module::embedding(weights.clone(), ids)
    }
}

fn check_id_range<B: Backend>(ids: &Tensor<B, 2, Int>, vocab_size: usize, side: &str) -> NmtResult<()> {
    let [batch_size, time_steps] = ids.dims();
    if batch_size == 0 || time_steps == 0 {
        return Ok(());
    }

    let min = ids.clone().min().into_scalar().elem::<i64>();
    let max = ids.clone().max().into_scalar().elem::<i64>();
    if min < 0 || max >= vocab_size as i64 {
        return Err(NmtError::Shape(format!(
            "{}語彙の範囲外のIDがあります: 最小 {}, 最大 {}, 語彙サイズ {}",
            side, min, max, vocab_size
        )));
    }
    Ok(())
}

fn load_vocab(
    path: &PathBuf,
    expected_size: usize,
    special_tokens: &SpecialTokens,
    check_special_token: bool,
) -> NmtResult<Vocabulary> {
    let vocab = Vocabulary::load(path, special_tokens, check_special_token)?;
    if vocab.vocab_size != expected_size {
        return Err(NmtError::Configuration(format!(
            "語彙サイズが一致しません: {} は {} 語ですが設定値は {} です",
            path.display(),
            vocab.vocab_size,
            expected_size
        )));
    }
    Ok(vocab)
}

fn load_table(path: Option<&PathBuf>) -> NmtResult<Option<EmbeddingTable>> {
    path.map(EmbeddingTable::load).transpose()
}

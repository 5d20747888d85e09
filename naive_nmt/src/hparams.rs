use crate::config;
use crate::error::{NmtError, Result};
use crate::vocabulary::{SpecialTokens, Vocabulary};
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// コマンドライン・JSONで指定できるハイパーパラメータ（未加工の値）
///
/// フラグ名はフィールド名と同じ（例: `--vocab_prefix`）。
/// 真偽値フラグは `--share_vocab` と `--share_vocab true|false` の両方を受け付ける。
#[derive(Args, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    // ===== ネットワーク =====
    /// ネットワークサイズ
    #[arg(long = "num_units", default_value_t = config::NUM_UNITS)]
    pub num_units: usize,
    /// ネットワークの深さ
    #[arg(long = "num_layers", default_value_t = config::NUM_LAYERS)]
    pub num_layers: usize,
    /// Encoderの深さ（省略時はnum_layers）
    #[arg(long = "num_encoder_layers")]
    pub num_encoder_layers: Option<usize>,
    /// Decoderの深さ（省略時はnum_layers）
    #[arg(long = "num_decoder_layers")]
    pub num_decoder_layers: Option<usize>,
    /// uni | bi | gnmt
    #[arg(long = "encoder_type", default_value = config::ENCODER_TYPE)]
    pub encoder_type: String,
    /// 残差接続を使うか
    #[arg(long = "residual", action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub residual: bool,
    /// RNNをtime-majorで動かすか
    #[arg(long = "time_major", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    pub time_major: bool,
    /// 埋め込み変数の分割数
    #[arg(long = "num_embeddings_partitions", default_value_t = 0)]
    pub num_embeddings_partitions: usize,
    /// ソース埋め込み次元（省略時はnum_units）
    #[arg(long = "source_embedding_size")]
    pub source_embedding_size: Option<usize>,
    /// ターゲット埋め込み次元（省略時はnum_units）
    #[arg(long = "target_embedding_size")]
    pub target_embedding_size: Option<usize>,

    // ===== Attention =====
    /// luong | scaled_luong | bahdanau | normed_bahdanau | ""（Attentionなし）
    #[arg(long = "attention", default_value = "")]
    pub attention: String,
    /// standard | gnmt | gnmt_v2
    #[arg(long = "attention_architecture", default_value = config::ATTENTION_ARCHITECTURE)]
    pub attention_architecture: String,
    #[arg(long = "output_attention", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    pub output_attention: bool,
    #[arg(long = "pass_hidden_state", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    pub pass_hidden_state: bool,

    // ===== オプティマイザ =====
    /// sgd | adam
    #[arg(long = "optimizer", default_value = config::OPTIMIZER)]
    pub optimizer: String,
    #[arg(long = "learning_rate", default_value_t = config::LEARNING_RATE)]
    pub learning_rate: f64,
    #[arg(long = "warmup_steps", default_value_t = 0)]
    pub warmup_steps: usize,
    #[arg(long = "warmup_scheme", default_value = config::WARMUP_SCHEME)]
    pub warmup_scheme: String,
    /// luong234 | luong5 | luong10 | ""
    #[arg(long = "decay_scheme", default_value = "")]
    pub decay_scheme: String,
    #[arg(long = "num_train_steps", default_value_t = config::NUM_TRAIN_STEPS)]
    pub num_train_steps: usize,
    #[arg(long = "colocate_gradients_with_ops", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    pub colocate_gradients_with_ops: bool,

    // ===== 初期化 =====
    /// uniform | glorot_normal | glorot_uniform
    #[arg(long = "init_op", default_value = config::INIT_OP)]
    pub init_op: String,
    /// uniformのとき [-init_weight, init_weight] で初期化
    #[arg(long = "init_weight", default_value_t = config::INIT_WEIGHT)]
    pub init_weight: f32,

    // ===== データ =====
    /// ソース言語の拡張子（例: en）
    #[arg(long = "src")]
    pub src: Option<String>,
    /// ターゲット言語の拡張子（例: vi）
    #[arg(long = "tgt")]
    pub tgt: Option<String>,
    #[arg(long = "train_prefix")]
    pub train_prefix: Option<PathBuf>,
    #[arg(long = "dev_prefix")]
    pub dev_prefix: Option<PathBuf>,
    #[arg(long = "test_prefix")]
    pub test_prefix: Option<PathBuf>,
    /// ログ・モデル・補正済み語彙の保存先
    #[arg(long = "out_dir")]
    pub out_dir: Option<PathBuf>,

    // ===== 語彙 =====
    /// 語彙ファイルのプレフィックス（`{prefix}.{src|tgt}` を読む）
    #[arg(long = "vocab_prefix")]
    pub vocab_prefix: Option<PathBuf>,
    /// Glove形式の事前学習済み埋め込みのプレフィックス
    #[arg(long = "embed_prefix")]
    pub embed_prefix: Option<PathBuf>,
    #[arg(long = "unk", default_value = config::UNK)]
    pub unk: String,
    #[arg(long = "sos", default_value = config::SOS)]
    pub sos: String,
    #[arg(long = "eos", default_value = config::EOS)]
    pub eos: String,
    /// ソースの語彙と埋め込みをターゲットでも使う
    #[arg(long = "share_vocab", action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub share_vocab: bool,
    /// 語彙ファイルに特殊トークンがあるか確認し、無ければ補う
    #[arg(long = "check_special_token", action = ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
    pub check_special_token: bool,

    // ===== シーケンス長 =====
    #[arg(long = "src_max_len", default_value_t = config::SRC_MAX_LEN)]
    pub src_max_len: usize,
    #[arg(long = "tgt_max_len", default_value_t = config::TGT_MAX_LEN)]
    pub tgt_max_len: usize,
    #[arg(long = "src_max_len_infer")]
    pub src_max_len_infer: Option<usize>,
    #[arg(long = "tgt_max_len_infer")]
    pub tgt_max_len_infer: Option<usize>,

    // ===== 既定値で十分なもの =====
    /// lstm | gru | layer_norm_lstm | nas
    #[arg(long = "unit_type", default_value = config::UNIT_TYPE)]
    pub unit_type: String,
    #[arg(long = "forget_bias", default_value_t = config::FORGET_BIAS)]
    pub forget_bias: f32,
    #[arg(long = "dropout", default_value_t = config::DROPOUT)]
    pub dropout: f32,
    #[arg(long = "max_gradient_norm", default_value_t = config::MAX_GRADIENT_NORM)]
    pub max_gradient_norm: f32,
    #[arg(long = "batch_size", default_value_t = config::BATCH_SIZE)]
    pub batch_size: usize,
    #[arg(long = "steps_per_stats", default_value_t = config::STEPS_PER_STATS)]
    pub steps_per_stats: usize,
    /// 訓練データの上限（0: 無制限）
    #[arg(long = "max_train", default_value_t = 0)]
    pub max_train: usize,
    #[arg(long = "num_buckets", default_value_t = config::NUM_BUCKETS)]
    pub num_buckets: usize,
    /// 訓練データの先頭から読み飛ばす行数
    #[arg(long = "skip_count", default_value_t = 0)]
    pub skip_count: usize,

    // ===== サブワード =====
    /// "" | bpe | spm
    #[arg(long = "subword_option", default_value = "")]
    pub subword_option: String,

    // ===== その他 =====
    #[arg(long = "num_gpus", default_value_t = config::NUM_GPUS)]
    pub num_gpus: usize,
    #[arg(long = "log_device_placement", action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub log_device_placement: bool,
    /// カンマ区切りの評価指標（bleu,rouge,accuracy）
    #[arg(long = "metrics", default_value = config::METRICS)]
    pub metrics: String,
    #[arg(long = "steps_per_external_eval")]
    pub steps_per_external_eval: Option<usize>,
    #[arg(long = "scope")]
    pub scope: Option<String>,
    /// 乱数シード（埋め込みの初期化・データのシャッフルに使う）
    #[arg(long = "random_seed")]
    pub random_seed: Option<u64>,
    #[arg(long = "override_loaded_hparams", action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub override_loaded_hparams: bool,
    #[arg(long = "num_keep_ckpts", default_value_t = config::NUM_KEEP_CKPTS)]
    pub num_keep_ckpts: usize,
    #[arg(long = "avg_ckpts", action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub avg_ckpts: bool,

    // ===== 推論 =====
    #[arg(long = "ckpt", default_value = "")]
    pub ckpt: String,
    #[arg(long = "inference_input_file")]
    pub inference_input_file: Option<PathBuf>,
    /// デコードする文のインデックス（カンマ区切り、0始まり）
    #[arg(long = "inference_list")]
    pub inference_list: Option<String>,
    #[arg(long = "infer_batch_size", default_value_t = config::INFER_BATCH_SIZE)]
    pub infer_batch_size: usize,
    #[arg(long = "inference_output_file")]
    pub inference_output_file: Option<PathBuf>,
    #[arg(long = "inference_ref_file")]
    pub inference_ref_file: Option<PathBuf>,
    /// 0ならgreedy
    #[arg(long = "beam_width", default_value_t = 0)]
    pub beam_width: usize,
    #[arg(long = "length_penalty_weight", default_value_t = 0.0)]
    pub length_penalty_weight: f32,
    #[arg(long = "sampling_temperature", default_value_t = 0.0)]
    pub sampling_temperature: f32,
    #[arg(long = "num_translations_per_input", default_value_t = config::NUM_TRANSLATIONS_PER_INPUT)]
    pub num_translations_per_input: usize,

    // ===== ジョブ =====
    #[arg(long = "jobid", default_value_t = 0)]
    pub jobid: usize,
    #[arg(long = "num_workers", default_value_t = config::NUM_WORKERS)]
    pub num_workers: usize,
    #[arg(long = "num_inter_threads", default_value_t = 0)]
    pub num_inter_threads: usize,
    #[arg(long = "num_intra_threads", default_value_t = 0)]
    pub num_intra_threads: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            num_units: config::NUM_UNITS,
            num_layers: config::NUM_LAYERS,
            num_encoder_layers: None,
            num_decoder_layers: None,
            encoder_type: config::ENCODER_TYPE.to_string(),
            residual: false,
            time_major: true,
            num_embeddings_partitions: 0,
            source_embedding_size: None,
            target_embedding_size: None,
            attention: String::new(),
            attention_architecture: config::ATTENTION_ARCHITECTURE.to_string(),
            output_attention: true,
            pass_hidden_state: true,
            optimizer: config::OPTIMIZER.to_string(),
            learning_rate: config::LEARNING_RATE,
            warmup_steps: 0,
            warmup_scheme: config::WARMUP_SCHEME.to_string(),
            decay_scheme: String::new(),
            num_train_steps: config::NUM_TRAIN_STEPS,
            colocate_gradients_with_ops: true,
            init_op: config::INIT_OP.to_string(),
            init_weight: config::INIT_WEIGHT,
            src: None,
            tgt: None,
            train_prefix: None,
            dev_prefix: None,
            test_prefix: None,
            out_dir: None,
            vocab_prefix: None,
            embed_prefix: None,
            unk: config::UNK.to_string(),
            sos: config::SOS.to_string(),
            eos: config::EOS.to_string(),
            share_vocab: false,
            check_special_token: true,
            src_max_len: config::SRC_MAX_LEN,
            tgt_max_len: config::TGT_MAX_LEN,
            src_max_len_infer: None,
            tgt_max_len_infer: None,
            unit_type: config::UNIT_TYPE.to_string(),
            forget_bias: config::FORGET_BIAS,
            dropout: config::DROPOUT,
            max_gradient_norm: config::MAX_GRADIENT_NORM,
            batch_size: config::BATCH_SIZE,
            steps_per_stats: config::STEPS_PER_STATS,
            max_train: 0,
            num_buckets: config::NUM_BUCKETS,
            skip_count: 0,
            subword_option: String::new(),
            num_gpus: config::NUM_GPUS,
            log_device_placement: false,
            metrics: config::METRICS.to_string(),
            steps_per_external_eval: None,
            scope: None,
            random_seed: None,
            override_loaded_hparams: false,
            num_keep_ckpts: config::NUM_KEEP_CKPTS,
            avg_ckpts: false,
            ckpt: String::new(),
            inference_input_file: None,
            inference_list: None,
            infer_batch_size: config::INFER_BATCH_SIZE,
            inference_output_file: None,
            inference_ref_file: None,
            beam_width: 0,
            length_penalty_weight: 0.0,
            sampling_temperature: 0.0,
            num_translations_per_input: config::NUM_TRANSLATIONS_PER_INPUT,
            jobid: 0,
            num_workers: config::NUM_WORKERS,
            num_inter_threads: 0,
            num_intra_threads: 0,
        }
    }
}

impl Options {
    pub fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            unk: self.unk.clone(),
            sos: self.sos.clone(),
            eos: self.eos.clone(),
        }
    }
}

/// 確定済みハイパーパラメータ
///
/// `HParamsBuilder::build` で一度だけ作り、以降は参照で各処理に渡す。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HParams {
    pub options: Options,
    pub num_encoder_layers: usize,
    pub num_decoder_layers: usize,
    pub metrics: Vec<String>,
    pub source_vocab_file: PathBuf,
    pub target_vocab_file: PathBuf,
    pub source_embed_file: Option<PathBuf>,
    pub target_embed_file: Option<PathBuf>,
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    pub source_embedding_size: usize,
    pub target_embedding_size: usize,
    /// 埋め込み初期化・シャッフル用のシード
    pub embedding_seed: u64,
}

/// メタデータ
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Metadata {
    pub crate_version: String,
    pub created_at: String,
}

#[derive(Serialize)]
struct HParamsFile<'a> {
    hparams: &'a HParams,
    metadata: Metadata,
}

impl HParams {
    pub fn special_tokens(&self) -> SpecialTokens {
        self.options.special_tokens()
    }

    /// `{dir}/hparams.json` に保存
    pub fn save(&self, save_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(save_dir).map_err(|e| NmtError::io(save_dir, e))?;

        let file = HParamsFile {
            hparams: self,
            metadata: Metadata {
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: chrono::Local::now().to_rfc3339(),
            },
        };

        let path = save_dir.join(config::HPARAMS_FILE);
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| NmtError::Configuration(format!("ハイパーパラメータの直列化に失敗: {}", e)))?;
        fs::write(&path, json).map_err(|e| NmtError::io(&path, e))?;

        info!(path = %path.display(), "ハイパーパラメータを保存");
        Ok(path)
    }
}

/// 既定値 → 上書き → 派生値の順でHParamsを組み立てる
#[derive(Debug, Clone, Default)]
pub struct HParamsBuilder {
    options: Options,
}

impl HParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// コマンドラインで解析済みのオプションから始める
    pub fn from_options(options: Options) -> Self {
        Self { options }
    }

    /// `{"batch_size": 4, ...}` 形式のJSONで上書き
    ///
    /// 未知のキーや型の合わない値は設定エラーになる。
    pub fn with_overrides(mut self, overrides: Value) -> Result<Self> {
        let Value::Object(overrides) = overrides else {
            return Err(NmtError::Configuration(
                "上書き設定はJSONオブジェクトである必要があります".to_string(),
            ));
        };

        let mut merged = serde_json::to_value(&self.options)
            .map_err(|e| NmtError::Configuration(format!("オプションの直列化に失敗: {}", e)))?;

        if let Value::Object(base) = &mut merged {
            for (key, value) in overrides {
                if !base.contains_key(&key) {
                    return Err(NmtError::Configuration(format!(
                        "未知のハイパーパラメータです: {}",
                        key
                    )));
                }
                base.insert(key, value);
            }
        }

        self.options = serde_json::from_value(merged)
            .map_err(|e| NmtError::Configuration(format!("ハイパーパラメータの値が不正です: {}", e)))?;
        Ok(self)
    }

    /// `--hparams_path` のJSONファイルで上書き
    pub fn with_json_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| NmtError::io(path, e))?;
        let overrides: Value = serde_json::from_str(&content).map_err(|e| {
            NmtError::format(path, e.line(), format!("JSONとして解釈できません: {}", e))
        })?;

        info!(path = %path.display(), "ハイパーパラメータをファイルで上書き");
        self.with_overrides(overrides)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// 派生値を計算してHParamsを確定する（語彙ファイルを読み込んでサイズを決める）
    pub fn build(self) -> Result<HParams> {
        let options = self.options;
        validate(&options)?;

        let src = required(&options.src, "src")?;
        let tgt = required(&options.tgt, "tgt")?;
        let vocab_prefix = required(&options.vocab_prefix, "vocab_prefix")?;

        let special_tokens = options.special_tokens();

        // 語彙ファイル
        let mut source_vocab_file = with_suffix(vocab_prefix, src);
        let mut target_vocab_file = if options.share_vocab {
            source_vocab_file.clone()
        } else {
            with_suffix(vocab_prefix, tgt)
        };

        let source_vocab =
            Vocabulary::load(&source_vocab_file, &special_tokens, options.check_special_token)?;
        source_vocab_file = persist_checked_vocab(&source_vocab, source_vocab_file, &options)?;

        let target_vocab_size = if options.share_vocab {
            target_vocab_file = source_vocab_file.clone();
            source_vocab.vocab_size
        } else {
            let target_vocab =
                Vocabulary::load(&target_vocab_file, &special_tokens, options.check_special_token)?;
            target_vocab_file = persist_checked_vocab(&target_vocab, target_vocab_file, &options)?;
            target_vocab.vocab_size
        };

        // 事前学習済み埋め込みファイル
        let source_embed_file = options.embed_prefix.as_ref().map(|p| with_suffix(p, src));
        let target_embed_file = options.embed_prefix.as_ref().map(|p| {
            if options.share_vocab {
                with_suffix(p, src)
            } else {
                with_suffix(p, tgt)
            }
        });

        let embedding_seed = match options.random_seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!(seed, "random_seed未指定のためシードを生成");
                seed
            }
        };

        let hparams = HParams {
            num_encoder_layers: options.num_encoder_layers.unwrap_or(options.num_layers),
            num_decoder_layers: options.num_decoder_layers.unwrap_or(options.num_layers),
            metrics: split_metrics(&options.metrics),
            source_vocab_file,
            target_vocab_file,
            source_embed_file,
            target_embed_file,
            source_vocab_size: source_vocab.vocab_size,
            target_vocab_size,
            source_embedding_size: options.source_embedding_size.unwrap_or(options.num_units),
            target_embedding_size: options.target_embedding_size.unwrap_or(options.num_units),
            embedding_seed,
            options,
        };

        info!(
            source_vocab_size = hparams.source_vocab_size,
            target_vocab_size = hparams.target_vocab_size,
            share_vocab = hparams.options.share_vocab,
            "ハイパーパラメータを確定"
        );

        Ok(hparams)
    }
}

fn validate(options: &Options) -> Result<()> {
    let positive = [
        ("num_units", options.num_units),
        ("num_layers", options.num_layers),
        ("batch_size", options.batch_size),
        ("num_buckets", options.num_buckets),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(NmtError::Configuration(format!(
                "{}は1以上である必要があります",
                name
            )));
        }
    }

    for (name, value) in [
        ("source_embedding_size", options.source_embedding_size),
        ("target_embedding_size", options.target_embedding_size),
        ("num_encoder_layers", options.num_encoder_layers),
        ("num_decoder_layers", options.num_decoder_layers),
    ] {
        if value == Some(0) {
            return Err(NmtError::Configuration(format!(
                "{}は1以上である必要があります",
                name
            )));
        }
    }

    if !matches!(options.subword_option.as_str(), "" | "bpe" | "spm") {
        return Err(NmtError::Configuration(format!(
            "未対応のsubword_optionです: {}",
            options.subword_option
        )));
    }

    let special = options.special_tokens();
    if special.unk.is_empty() || special.sos.is_empty() || special.eos.is_empty() {
        return Err(NmtError::Configuration(
            "特殊トークンに空文字列は指定できません".to_string(),
        ));
    }

    Ok(())
}

fn required<'a, T>(value: &'a Option<T>, name: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| NmtError::Configuration(format!("{}が指定されていません", name)))
}

/// `{prefix}.{suffix}`
pub(crate) fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// 特殊トークンを補った語彙をout_dirに書き出し、そのパスを返す
fn persist_checked_vocab(vocab: &Vocabulary, original: PathBuf, options: &Options) -> Result<PathBuf> {
    if vocab.inserted == 0 {
        return Ok(original);
    }

    match (&options.out_dir, original.file_name()) {
        (Some(out_dir), Some(file_name)) => vocab.save(out_dir.join(file_name)),
        _ => {
            warn!(
                path = %original.display(),
                inserted = vocab.inserted,
                "特殊トークンを補いましたがout_dir未指定のため語彙ファイルは書き出しません"
            );
            Ok(original)
        }
    }
}

fn split_metrics(metrics: &str) -> Vec<String> {
    metrics
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

// 特殊トークン
pub const UNK: &str = "<unk>"; // 未知語
pub const SOS: &str = "<s>"; // 文頭
pub const EOS: &str = "</s>"; // 文末

// ネットワーク
pub const NUM_UNITS: usize = 32; // 隠れ層の次元数（埋め込み次元の既定値も兼ねる）
pub const NUM_LAYERS: usize = 2; // Encoder/Decoderのレイヤー数
pub const ENCODER_TYPE: &str = "uni"; // uni | bi | gnmt
pub const UNIT_TYPE: &str = "lstm"; // lstm | gru | layer_norm_lstm | nas
pub const FORGET_BIAS: f32 = 1.0;
pub const DROPOUT: f32 = 0.2;

// Attention
pub const ATTENTION_ARCHITECTURE: &str = "standard"; // standard | gnmt | gnmt_v2

// オプティマイザ
pub const OPTIMIZER: &str = "sgd"; // sgd | adam
pub const LEARNING_RATE: f64 = 1.0;
pub const WARMUP_SCHEME: &str = "t2t";
pub const NUM_TRAIN_STEPS: usize = 12000;
pub const MAX_GRADIENT_NORM: f32 = 5.0;

// 初期化
pub const INIT_OP: &str = "uniform"; // uniform | glorot_normal | glorot_uniform
pub const INIT_WEIGHT: f32 = 0.1; // 一様分布の範囲 [-INIT_WEIGHT, INIT_WEIGHT]

// データ
pub const SRC_MAX_LEN: usize = 50; // 訓練時のソース最大長
pub const TGT_MAX_LEN: usize = 50; // 訓練時のターゲット最大長
pub const BATCH_SIZE: usize = 128;
pub const INFER_BATCH_SIZE: usize = 32;
pub const NUM_BUCKETS: usize = 5; // 長さ別バケット数
pub const BUCKET_WIDTH_UNBOUNDED: usize = 10; // src_max_lenが0のときのバケット幅

// その他
pub const STEPS_PER_STATS: usize = 100;
pub const NUM_GPUS: usize = 1;
pub const METRICS: &str = "bleu"; // カンマ区切り
pub const NUM_KEEP_CKPTS: usize = 5;
pub const NUM_WORKERS: usize = 1;
pub const NUM_TRANSLATIONS_PER_INPUT: usize = 1;

// 出力ファイル名
pub const HPARAMS_FILE: &str = "hparams.json";

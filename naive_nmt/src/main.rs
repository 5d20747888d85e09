use burn::backend::ndarray::NdArray;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::prelude::*;
use clap::Parser;
use naive_nmt::dataset::{DatasetMode, ParallelDataset};
use naive_nmt::embedding::{EmbeddingConfig, Seq2SeqEmbedding};
use naive_nmt::hparams::{HParams, HParamsBuilder, Options};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Seq2Seq翻訳の語彙・埋め込み・ハイパーパラメータを構築する
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    options: Options,

    /// ハイパーパラメータを上書きするJSONファイル
    #[arg(long = "hparams_path")]
    hparams_path: Option<PathBuf>,

    /// バックエンドの選択（ndarray, wgpu）
    #[arg(long, default_value = "ndarray")]
    backend: String,

    /// Encoder埋め込みを確認するトークン列（スペース区切り）
    #[arg(long = "lookup_src")]
    lookup_src: Option<String>,

    /// Decoder埋め込みを確認するトークン列（スペース区切り）
    #[arg(long = "lookup_tgt")]
    lookup_tgt: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let start_time = Instant::now();
    let args = Args::parse();

    // ハイパーパラメータは起動時に一度だけ確定させる
    let mut builder = HParamsBuilder::from_options(args.options.clone());
    if let Some(path) = &args.hparams_path {
        builder = builder.with_json_file(path)?;
    }
    let hparams = builder.build()?;

    if let Some(out_dir) = &hparams.options.out_dir {
        hparams.save(out_dir)?;
    }

    match args.backend.as_str() {
        "ndarray" => run::<NdArray>(&args, &hparams, &Default::default())?,
        "wgpu" => run::<Wgpu>(&args, &hparams, &WgpuDevice::default())?,
        other => return Err(format!("未対応のバックエンド: {}", other).into()),
    }

    let duration = start_time.elapsed();
    println!("\n実行時間: {:.2}秒", duration.as_secs_f64());

    Ok(())
}

fn run<B: Backend>(
    args: &Args,
    hparams: &HParams,
    device: &B::Device,
) -> Result<(), Box<dyn std::error::Error>> {
    let embedding = EmbeddingConfig::from_hparams(hparams).init::<B>(device)?;

    println!("===== 埋め込み =====");
    println!(
        "ソース語彙: {}語 / 埋め込み次元: {}",
        embedding.source_vocab().vocab_size,
        embedding.source_embedding_size()
    );
    println!(
        "ターゲット語彙: {}語 / 埋め込み次元: {}",
        embedding.target_vocab().vocab_size,
        embedding.target_embedding_size()
    );
    println!("語彙共有: {}", embedding.is_shared());

    if let Some(text) = &args.lookup_src {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let output = embedding.encoder_embedding_input(&[tokens])?;
        print_embedding("Encoder", &output)?;
    }

    if let Some(text) = &args.lookup_tgt {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let output = embedding.decoder_embedding_input(&[tokens])?;
        print_embedding("Decoder", &output)?;
    }

    if hparams.options.train_prefix.is_some() {
        summarize_dataset(hparams, &embedding, device)?;
    }

    Ok(())
}

/// 訓練データを読み込み、先頭バッチの埋め込み形状を表示
fn summarize_dataset<B: Backend>(
    hparams: &HParams,
    embedding: &Seq2SeqEmbedding<B>,
    device: &B::Device,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n===== 訓練データ =====");
    let dataset = ParallelDataset::load(
        hparams,
        embedding.source_vocab(),
        embedding.target_vocab(),
        DatasetMode::Train,
    )?;
    let batches = dataset.batches();
    println!("訓練サンプル数: {} / バッチ数: {}", dataset.len(), batches.len());

    if let Some(batch) = batches.first() {
        let encoder_input = embedding.encoder_embedding_lookup(batch.source_tensor::<B>(device))?;
        let decoder_input =
            embedding.decoder_embedding_lookup(batch.target_input_tensor::<B>(device))?;
        println!("Encoder入力: {:?}", encoder_input.dims());
        println!("Decoder入力: {:?}", decoder_input.dims());
    }

    Ok(())
}

fn print_embedding<B: Backend>(
    label: &str,
    output: &Tensor<B, 3>,
) -> Result<(), Box<dyn std::error::Error>> {
    let [batch_size, time_steps, embedding_size] = output.dims();
    println!("\n===== {}埋め込み =====", label);
    println!("形状: [{}, {}, {}]", batch_size, time_steps, embedding_size);

    let values: Vec<f32> = output
        .to_data()
        .to_vec()
        .map_err(|e| format!("テンソルの読み出しエラー: {:?}", e))?;

    for (step, vector) in values.chunks(embedding_size.max(1)).enumerate() {
        let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{:.4}", v)).collect();
        println!("  t={}: [{}]", step, preview.join(", "));
    }

    Ok(())
}

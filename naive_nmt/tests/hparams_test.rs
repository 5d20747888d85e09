use burn::backend::ndarray::NdArray;
use clap::Parser;
use naive_nmt::embedding::EmbeddingConfig;
use naive_nmt::hparams::{HParamsBuilder, Options};
use naive_nmt::vocabulary::{SpecialTokens, Vocabulary};
use naive_nmt::NmtError;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name)
}

/// en-vi のテストデータを指すオプション
fn base_options() -> Options {
    Options {
        src: Some("en".to_string()),
        tgt: Some("vi".to_string()),
        vocab_prefix: Some(testdata("test_embed_vocab")),
        random_seed: Some(5),
        ..Options::default()
    }
}

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    options: Options,
}

#[test]
fn test_defaults() {
    let options = Options::default();
    assert_eq!(options.num_units, 32);
    assert_eq!(options.num_layers, 2);
    assert_eq!(options.unk, "<unk>");
    assert_eq!(options.sos, "<s>");
    assert_eq!(options.eos, "</s>");
    assert_eq!(options.batch_size, 128);
    assert_eq!(options.src_max_len, 50);
    assert!(!options.share_vocab);
    assert!(options.check_special_token);
    assert_eq!(options.metrics, "bleu");
}

#[test]
fn test_command_line_flags() {
    println!("=== テスト: コマンドライン引数 ===");

    let cli = Cli::parse_from([
        "naive_nmt",
        "--src",
        "en",
        "--tgt",
        "vi",
        "--num_units",
        "64",
        "--share_vocab",
        "--check_special_token",
        "false",
        "--sos",
        "<bos>",
    ]);

    assert_eq!(cli.options.src.as_deref(), Some("en"));
    assert_eq!(cli.options.num_units, 64);
    assert!(cli.options.share_vocab);
    assert!(!cli.options.check_special_token);
    assert_eq!(cli.options.sos, "<bos>");
    // 指定しなかった値は既定値
    assert_eq!(cli.options.eos, "</s>");
    assert_eq!(cli.options.num_layers, 2);
}

#[test]
fn test_command_line_defaults_match_default_impl() {
    let cli = Cli::parse_from(["naive_nmt"]);
    assert_eq!(cli.options, Options::default());
}

#[test]
fn test_build_derived_values() {
    println!("=== テスト: 派生ハイパーパラメータ ===");

    let options = Options {
        num_encoder_layers: Some(3),
        metrics: "bleu, rouge,accuracy".to_string(),
        ..base_options()
    };
    let hparams = HParamsBuilder::from_options(options).build().unwrap();

    assert_eq!(hparams.source_vocab_file, testdata("test_embed_vocab.en"));
    assert_eq!(hparams.target_vocab_file, testdata("test_embed_vocab.vi"));
    assert_eq!(hparams.source_vocab_size, 6);
    assert_eq!(hparams.target_vocab_size, 6);
    assert_eq!(hparams.num_encoder_layers, 3);
    assert_eq!(hparams.num_decoder_layers, 2);
    assert_eq!(hparams.metrics, vec!["bleu", "rouge", "accuracy"]);
    assert_eq!(hparams.source_embedding_size, 32);
    assert_eq!(hparams.target_embedding_size, 32);
    assert_eq!(hparams.source_embed_file, None);
    assert_eq!(hparams.embedding_seed, 5);
}

#[test]
fn test_embed_prefix_paths() {
    let options = Options {
        embed_prefix: Some(testdata("test_embed")),
        source_embedding_size: Some(4),
        target_embedding_size: Some(4),
        ..base_options()
    };
    let hparams = HParamsBuilder::from_options(options).build().unwrap();

    assert_eq!(hparams.source_embed_file, Some(testdata("test_embed.en")));
    assert_eq!(hparams.target_embed_file, Some(testdata("test_embed.vi")));

    // そのまま埋め込みを構築できる
    let device = Default::default();
    let embedding = EmbeddingConfig::from_hparams(&hparams)
        .init::<NdArray>(&device)
        .unwrap();
    assert_eq!(embedding.source_weights().dims(), [6, 4]);
    assert_eq!(embedding.target_weights().dims(), [6, 4]);
}

#[test]
fn test_share_vocab_uses_source_files() {
    let options = Options {
        share_vocab: true,
        ..base_options()
    };
    let hparams = HParamsBuilder::from_options(options).build().unwrap();

    assert_eq!(hparams.target_vocab_file, hparams.source_vocab_file);
    assert_eq!(hparams.target_vocab_size, hparams.source_vocab_size);

    let device = Default::default();
    let embedding = EmbeddingConfig::from_hparams(&hparams)
        .init::<NdArray>(&device)
        .unwrap();
    assert!(embedding.is_shared());
}

#[test]
fn test_missing_required_values() {
    let options = Options {
        vocab_prefix: None,
        ..base_options()
    };
    let result = HParamsBuilder::from_options(options).build();
    assert!(matches!(result, Err(NmtError::Configuration(_))));

    let options = Options {
        src: None,
        ..base_options()
    };
    let result = HParamsBuilder::from_options(options).build();
    assert!(matches!(result, Err(NmtError::Configuration(_))));
}

#[test]
fn test_invalid_values() {
    let options = Options {
        num_units: 0,
        ..base_options()
    };
    let result = HParamsBuilder::from_options(options).build();
    assert!(matches!(result, Err(NmtError::Configuration(_))));

    let options = Options {
        subword_option: "wordpiece".to_string(),
        ..base_options()
    };
    let result = HParamsBuilder::from_options(options).build();
    assert!(matches!(result, Err(NmtError::Configuration(_))));
}

#[test]
fn test_json_overrides() {
    let builder = HParamsBuilder::from_options(base_options())
        .with_overrides(json!({ "batch_size": 4, "share_vocab": true, "eos": "EOS" }))
        .unwrap();

    assert_eq!(builder.options().batch_size, 4);
    assert!(builder.options().share_vocab);
    assert_eq!(builder.options().eos, "EOS");
    // 上書きしていない値は残る
    assert_eq!(builder.options().src.as_deref(), Some("en"));
}

#[test]
fn test_json_override_errors() {
    let result = HParamsBuilder::new().with_overrides(json!({ "no_such_flag": 1 }));
    assert!(matches!(result, Err(NmtError::Configuration(_))));

    let result = HParamsBuilder::new().with_overrides(json!({ "batch_size": "many" }));
    assert!(matches!(result, Err(NmtError::Configuration(_))));

    let result = HParamsBuilder::new().with_overrides(json!([1, 2]));
    assert!(matches!(result, Err(NmtError::Configuration(_))));
}

#[test]
fn test_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overrides.json");
    fs::write(&path, r#"{ "num_layers": 4, "metrics": "bleu,rouge" }"#).unwrap();

    let hparams = HParamsBuilder::from_options(base_options())
        .with_json_file(&path)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(hparams.num_encoder_layers, 4);
    assert_eq!(hparams.num_decoder_layers, 4);
    assert_eq!(hparams.metrics, vec!["bleu", "rouge"]);

    fs::write(&path, "{ broken").unwrap();
    let result = HParamsBuilder::new().with_json_file(&path);
    assert!(matches!(result, Err(NmtError::Format { .. })));
}

#[test]
fn test_checked_vocab_written_to_out_dir() {
    println!("=== テスト: 補正済み語彙の書き出し ===");

    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        vocab_prefix: Some(testdata("test_vocab_no_special")),
        share_vocab: true,
        out_dir: Some(dir.path().to_path_buf()),
        ..base_options()
    };
    let hparams = HParamsBuilder::from_options(options).build().unwrap();

    let written = dir.path().join("test_vocab_no_special.en");
    assert_eq!(hparams.source_vocab_file, written);
    assert_eq!(hparams.target_vocab_file, written);
    assert_eq!(hparams.source_vocab_size, 6);

    let vocab = Vocabulary::load(&written, &SpecialTokens::default(), true).unwrap();
    assert_eq!(vocab.inserted, 0);
    assert_eq!(vocab.id_to_token[..3], ["<unk>", "<s>", "</s>"]);
}

#[test]
fn test_save_hparams() {
    let dir = tempfile::tempdir().unwrap();
    let hparams = HParamsBuilder::from_options(base_options()).build().unwrap();

    let path = hparams.save(dir.path()).unwrap();
    assert_eq!(path, dir.path().join("hparams.json"));

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["hparams"]["source_vocab_size"], 6);
    assert_eq!(saved["hparams"]["options"]["src"], "en");
    assert!(saved["metadata"]["created_at"].is_string());
}

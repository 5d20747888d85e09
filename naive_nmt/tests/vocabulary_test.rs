use naive_nmt::vocabulary::{SpecialTokens, Vocabulary};
use naive_nmt::NmtError;
use std::fs;
use std::path::PathBuf;

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name)
}

#[test]
fn test_load_vocab_with_special_tokens() {
    println!("=== テスト: 特殊トークン入りの語彙 ===");

    let vocab = Vocabulary::load(
        testdata("test_embed_vocab.en"),
        &SpecialTokens::default(),
        true,
    )
    .unwrap();

    assert_eq!(vocab.vocab_size, 6);
    assert_eq!(vocab.inserted, 0);
    assert_eq!(vocab.unk_id, 0);
    assert_eq!(vocab.sos_id, Some(1));
    assert_eq!(vocab.eos_id, Some(2));
    assert_eq!(vocab.id("behind"), Some(4));
    assert_eq!(vocab.token(5), Some("scenes"));
}

#[test]
fn test_missing_special_tokens_are_prepended() {
    println!("=== テスト: 特殊トークンの補完 ===");

    let vocab = Vocabulary::load(
        testdata("test_vocab_no_special.en"),
        &SpecialTokens::default(),
        true,
    )
    .unwrap();

    // unk, sos, eos の順で先頭に入る
    assert_eq!(vocab.inserted, 3);
    assert_eq!(vocab.vocab_size, 6);
    assert_eq!(
        vocab.id_to_token,
        vec!["<unk>", "<s>", "</s>", "The", "behind", "scenes"]
    );
}

#[test]
fn test_partial_special_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vocab.en");
    fs::write(&path, "</s>\nhello\nworld\n").unwrap();

    let vocab = Vocabulary::load(&path, &SpecialTokens::default(), true).unwrap();

    assert_eq!(vocab.inserted, 2);
    assert_eq!(vocab.id_to_token[..3], ["<unk>", "<s>", "</s>"]);
    assert_eq!(vocab.eos_id, Some(2));
}

#[test]
fn test_check_disabled_keeps_file_as_is() {
    let vocab = Vocabulary::load(
        testdata("test_vocab_no_special.en"),
        &SpecialTokens::default(),
        false,
    )
    .unwrap();

    assert_eq!(vocab.inserted, 0);
    assert_eq!(vocab.vocab_size, 3);
    assert_eq!(vocab.sos_id, None);
    assert_eq!(vocab.eos_id, None);
    // unkが無いときはID 0
    assert_eq!(vocab.id_or_unk("unknown"), 0);
}

#[test]
fn test_custom_special_tokens() {
    let special = SpecialTokens {
        unk: "UNK".to_string(),
        sos: "BOS".to_string(),
        eos: "EOS".to_string(),
    };
    let vocab = Vocabulary::from_tokens(["a", "EOS", "b"], &special, true).unwrap();

    assert_eq!(vocab.id_to_token, vec!["UNK", "BOS", "a", "EOS", "b"]);
    assert_eq!(vocab.eos_id, Some(3));
}

#[test]
fn test_blank_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vocab.vi");
    fs::write(&path, "<unk>\n\n<s>\n</s>\n  \nKhoa\n").unwrap();

    let vocab = Vocabulary::load(&path, &SpecialTokens::default(), true).unwrap();
    assert_eq!(vocab.vocab_size, 4);
    assert_eq!(vocab.id("Khoa"), Some(3));
}

#[test]
fn test_duplicate_token_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vocab.en");
    fs::write(&path, "<unk>\n<s>\n</s>\nThe\nThe\n").unwrap();

    match Vocabulary::load(&path, &SpecialTokens::default(), true) {
        Err(NmtError::Format { line, .. }) => assert_eq!(line, 5),
        other => panic!("形式エラーを期待: {:?}", other.map(|v| v.vocab_size)),
    }
}

#[test]
fn test_duplicate_in_memory_token_is_format_error() {
    // ファイルからの読み込みと同じ扱い
    let result = Vocabulary::from_tokens(["a", "", "a"], &SpecialTokens::default(), true);
    match result {
        Err(NmtError::Format { line, .. }) => assert_eq!(line, 3),
        other => panic!("形式エラーを期待: {:?}", other.map(|v| v.vocab_size)),
    }
}

#[test]
fn test_missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Vocabulary::load(dir.path().join("none.en"), &SpecialTokens::default(), true);
    assert!(matches!(result, Err(NmtError::Configuration(_))));
}

#[test]
fn test_empty_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.en");
    fs::write(&path, "\n\n").unwrap();

    let result = Vocabulary::load(&path, &SpecialTokens::default(), true);
    assert!(matches!(result, Err(NmtError::Configuration(_))));
}

#[test]
fn test_encode_and_decode() {
    let vocab = Vocabulary::load(
        testdata("test_embed_vocab.vi"),
        &SpecialTokens::default(),
        true,
    )
    .unwrap();

    let ids = vocab.encode(&["Khoa", "xyz", "sau"]);
    assert_eq!(ids, vec![3, 0, 5]);

    // sos/eosは出力しない
    assert_eq!(vocab.decode(&[1, 3, 4, 2]), "Khoa học");
}

#[test]
fn test_save_writes_corrected_vocab() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocabulary::load(
        testdata("test_vocab_no_special.en"),
        &SpecialTokens::default(),
        true,
    )
    .unwrap();

    let saved = vocab.save(dir.path().join("out/vocab.en")).unwrap();
    let reloaded = Vocabulary::load(&saved, &SpecialTokens::default(), true).unwrap();

    assert_eq!(reloaded.inserted, 0);
    assert_eq!(reloaded.id_to_token, vocab.id_to_token);
}

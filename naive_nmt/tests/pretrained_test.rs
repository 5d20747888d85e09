use naive_nmt::pretrained::EmbeddingTable;
use naive_nmt::NmtError;
use std::io::Cursor;
use std::path::PathBuf;

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name)
}

fn parse(content: &str) -> naive_nmt::Result<EmbeddingTable> {
    EmbeddingTable::from_reader(Cursor::new(content), "inline.txt")
}

#[test]
fn test_load_embedding_file() {
    println!("=== テスト: 事前学習済み埋め込みの読み込み ===");

    let table = EmbeddingTable::load(testdata("test_embed.vi")).unwrap();

    assert_eq!(table.dim(), 4);
    assert_eq!(table.len(), 3);
    assert_eq!(table.get("học"), Some(&[1.2, 2.2, 3.3, 4.3][..]));
    assert!(table.contains("sau"));
    assert!(!table.contains("<unk>"));
}

#[test]
fn test_header_line_is_skipped() {
    let table = parse("2 3\nfoo 0.1 0.2 0.3\nbar 1 2 3\n").unwrap();
    assert_eq!(table.dim(), 3);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_tabs_and_repeated_spaces() {
    let table = parse("foo\t0.5\t1.5\nbar  2.5   3.5 \n").unwrap();
    assert_eq!(table.dim(), 2);
    assert_eq!(table.get("foo"), Some(&[0.5, 1.5][..]));
    assert_eq!(table.get("bar"), Some(&[2.5, 3.5][..]));
}

#[test]
fn test_header_dim_mismatch() {
    let result = parse("2 4\nfoo 0.1 0.2 0.3\n");
    assert!(matches!(result, Err(NmtError::Format { line: 1, .. })));
}

#[test]
fn test_inconsistent_length_reports_line() {
    let result = parse("foo 0.1 0.2\n\nbar 0.3\n");
    match result {
        Err(NmtError::Format { line, .. }) => assert_eq!(line, 3),
        other => panic!("形式エラーを期待: {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_non_numeric_value() {
    let result = parse("foo 0.1 abc\n");
    assert!(matches!(result, Err(NmtError::Format { line: 1, .. })));
}

#[test]
fn test_token_without_vector() {
    let result = parse("foo 0.1\nbar\n");
    assert!(matches!(result, Err(NmtError::Format { line: 2, .. })));
}

#[test]
fn test_empty_file() {
    assert!(matches!(parse("\n"), Err(NmtError::Format { .. })));
}

#[test]
fn test_duplicate_token_last_wins() {
    let table = parse("foo 1 1\nfoo 2 2\n").unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get("foo"), Some(&[2.0, 2.0][..]));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = EmbeddingTable::load(dir.path().join("none.vi"));
    assert!(matches!(result, Err(NmtError::Io { .. })));
}

use quarry_core::persist::write_index;
use quarry_core::tokenizer::Analyzer;
use quarry_core::{CancelFlag, DocTerms, IndexBuilder, QuarryError};
use searcher::{SearchOptions, SearchSession, SessionReport};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Writes `docs` under a temp dir, indexes them in the given order and returns
/// the temp dir, the index location and the document paths.
fn build_index(docs: &[(&str, &str)]) -> (TempDir, PathBuf, Vec<PathBuf>) {
    let dir = tempdir().unwrap();
    let analyzer = Analyzer::default();
    let mut builder = IndexBuilder::new(analyzer.config());
    let mut paths = Vec::new();
    for (name, text) in docs {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        builder.add_document(path.to_string_lossy(), DocTerms::from_stream(&analyzer.analyze(text)));
        paths.push(path);
    }
    let root = dir.path().join("index");
    write_index(&root, &builder.finish(), "2024-01-01T00:00:00Z", &CancelFlag::new()).unwrap();
    (dir, root, paths)
}

async fn run(index: &Path, queries: &str, options: SearchOptions) -> (String, SessionReport) {
    let session = SearchSession::open(index, options).unwrap();
    let mut out = Vec::new();
    let report = session.run(queries.as_bytes(), &mut out, &CancelFlag::new()).await.unwrap();
    (String::from_utf8(out).unwrap(), report)
}

#[tokio::test]
async fn single_document_end_to_end() {
    let (_dir, index, paths) = build_index(&[("a.txt", "cat dog cat")]);
    let (out, report) = run(&index, "cat\n", SearchOptions::default()).await;

    let expected = format!(
        "Searching for: cat\n1 total matching documents\n1. {}\ncat dog cat\n\n",
        paths[0].display()
    );
    assert_eq!(out, expected);
    assert_eq!(report.queries, 1);
    assert!(report.malformed.is_empty());
}

#[tokio::test]
async fn results_render_in_rank_order() {
    let (_dir, index, paths) = build_index(&[("a.txt", "cat"), ("b.txt", "cat cat"), ("c.txt", "dog")]);
    let (out, _) = run(&index, "cat dog", SearchOptions::default()).await;

    let first = out.find(&format!("1. {}", paths[1].display())).unwrap();
    let second = out.find(&format!("2. {}", paths[0].display())).unwrap();
    let third = out.find(&format!("3. {}", paths[2].display())).unwrap();
    assert!(first < second && second < third);
    assert!(out.contains("3 total matching documents"));
}

#[tokio::test]
async fn hits_per_page_limits_rendered_results() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat"), ("b.txt", "cat"), ("c.txt", "cat")]);
    let options = SearchOptions { hits_per_page: 2, ..Default::default() };
    let (out, _) = run(&index, "cat", options).await;
    assert!(out.contains("3 total matching documents"));
    assert!(out.contains("\n2. "));
    assert!(!out.contains("\n3. "));
}

#[tokio::test]
async fn malformed_line_does_not_stop_the_session() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat dog"), ("b.txt", "bird")]);
    let queries = "cat\ndog\n(cat dog\nbird\ncat AND dog\n";
    let (out, report) = run(&index, queries, SearchOptions::default()).await;

    assert_eq!(report.malformed.len(), 1);
    assert_eq!(report.malformed[0].line_no, 3);
    assert_eq!(report.queries, 4);
    assert_eq!(out.matches("Searching for:").count(), 4);
    assert!(out.contains("Malformed query on line 3"));
    assert!(out.contains("Searching for: bird"));
    assert!(out.contains("Searching for: +cat +dog"));
}

#[tokio::test]
async fn vanished_file_renders_placeholder() {
    let (_dir, index, paths) = build_index(&[("a.txt", "cat"), ("b.txt", "cat cat")]);
    fs::remove_file(&paths[1]).unwrap();
    let (out, report) = run(&index, "cat", SearchOptions::default()).await;

    assert_eq!(report.unavailable, 1);
    assert!(out.contains(&format!("1. {}\n[content unavailable:", paths[1].display())));
    assert!(out.contains(&format!("2. {}\ncat\n", paths[0].display())));
}

#[tokio::test]
async fn modified_file_shows_current_content() {
    let (_dir, index, paths) = build_index(&[("a.txt", "cat")]);
    fs::write(&paths[0], "cat has moved on").unwrap();
    let (out, _) = run(&index, "cat", SearchOptions::default()).await;
    assert!(out.contains("cat has moved on\n"));
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat")]);
    let (out, report) = run(&index, "\ncat\n   \n", SearchOptions::default()).await;
    assert_eq!(report.queries, 1);
    assert!(report.malformed.is_empty());
    assert_eq!(out.matches("Searching for:").count(), 1);
}

#[tokio::test]
async fn no_matches_reports_zero() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat")]);
    let (out, report) = run(&index, "zebra", SearchOptions::default()).await;
    assert_eq!(out, "Searching for: zebra\n0 total matching documents\n");
    assert_eq!(report.queries, 1);
}

#[tokio::test]
async fn cancelled_session_stops_before_next_line() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat")]);
    let session = SearchSession::open(&index, SearchOptions::default()).unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut out = Vec::new();
    let report = session.run("cat\ncat\n".as_bytes(), &mut out, &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.queries, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn queries_file_is_read_from_disk() {
    let (dir, index, _) = build_index(&[("a.txt", "cat")]);
    let queries = dir.path().join("queries.txt");
    fs::write(&queries, "cat\ndog\n").unwrap();
    let session = SearchSession::open(&index, SearchOptions::default()).unwrap();
    let mut out = Vec::new();
    let report = session.run_file(&queries, &mut out, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.queries, 2);
}

#[test]
fn missing_index_is_fatal() {
    let dir = tempdir().unwrap();
    let err = SearchSession::open(dir.path().join("index"), SearchOptions::default()).err().unwrap();
    assert!(matches!(err, QuarryError::IndexOpen { .. }));
}

#[tokio::test]
async fn lost_postings_fail_only_their_line() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat dog")]);
    let session = SearchSession::open(&index, SearchOptions::default()).unwrap();
    // Term ids follow term order, so `cat` owns the first postings file.
    fs::remove_file(index.join("postings").join("00000000.postings.bin")).unwrap();

    let mut out = Vec::new();
    let report = session.run("cat\ndog\n".as_bytes(), &mut out, &CancelFlag::new()).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].line_no, 1);
    assert_eq!(report.queries, 1);
    assert!(out.contains("Search failed on line 1"));
    assert!(out.contains("Searching for: dog\n1 total matching documents\n"));
}

#[test]
fn unindexed_default_field_is_rejected_at_open() {
    let (_dir, index, _) = build_index(&[("a.txt", "cat")]);
    let options = SearchOptions { field: "title".into(), ..Default::default() };
    let err = SearchSession::open(&index, options).err().unwrap();
    assert!(matches!(err, QuarryError::IndexOpen { .. }));
    assert!(err.to_string().contains("title"));
}

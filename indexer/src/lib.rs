use anyhow::{bail, Context, Result};
use quarry_core::persist::write_index;
use quarry_core::tokenizer::{Analyzer, AnalyzerConfig};
use quarry_core::{CancelFlag, DocTerms, IndexBuilder, InvertedIndex, QuarryError};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub analyzer: AnalyzerConfig,
    /// Worker threads for reading and analysis. `None` uses rayon's default.
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct BuildReport {
    pub num_docs: u32,
    pub num_terms: u32,
    pub skipped: Vec<SkippedFile>,
    pub elapsed: Duration,
}

enum Loaded {
    Doc { path: String, terms: DocTerms },
    Skipped(SkippedFile),
    Cancelled,
}

/// Every regular file under `root`, in lexicographic path order.
/// Entries the walk cannot descend into are reported, not fatal.
pub fn collect_files(root: &Path) -> Result<(Vec<PathBuf>, Vec<SkippedFile>)> {
    if !root.exists() {
        bail!("document root {} does not exist", root.display());
    }
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                skipped.push(SkippedFile { path, reason: e.to_string() });
            }
        }
    }
    files.sort();
    Ok((files, skipped))
}

fn load(path: &Path, analyzer: &Analyzer, cancel: &CancelFlag) -> Loaded {
    if cancel.is_cancelled() {
        return Loaded::Cancelled;
    }
    let skip = |e: std::io::Error| {
        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
        Loaded::Skipped(SkippedFile { path: path.to_path_buf(), reason: e.to_string() })
    };
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return skip(e),
    };
    let abs = match fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => return skip(e),
    };
    let text = String::from_utf8_lossy(&bytes);
    let terms = DocTerms::from_stream(&analyzer.analyze(&text));
    Loaded::Doc { path: abs.to_string_lossy().into_owned(), terms }
}

/// Read and analyze `files` in parallel, then assign doc ids sequentially in
/// list order so ids never depend on thread scheduling.
pub fn index_files(files: &[PathBuf], options: &BuildOptions, cancel: &CancelFlag) -> Result<(InvertedIndex, Vec<SkippedFile>)> {
    let analyzer = Analyzer::new(options.analyzer);
    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = options.threads {
        pool = pool.num_threads(n);
    }
    let pool = pool.build().context("failed to start indexing workers")?;
    let loaded: Vec<Loaded> = pool.install(|| files.par_iter().map(|p| load(p, &analyzer, cancel)).collect());

    let mut builder = IndexBuilder::new(options.analyzer);
    let mut skipped = Vec::new();
    for item in loaded {
        match item {
            Loaded::Doc { path, terms } => {
                let doc_id = builder.add_document(path.as_str(), terms);
                tracing::debug!(doc_id, path = %path, "indexed");
            }
            Loaded::Skipped(s) => skipped.push(s),
            Loaded::Cancelled => return Err(QuarryError::Cancelled.into()),
        }
    }
    cancel.check()?;
    Ok((builder.finish(), skipped))
}

/// Walk `docs_root`, build a fresh index and publish it at `index_dir`,
/// replacing any previous index there.
pub fn build_index(docs_root: &Path, index_dir: &Path, options: &BuildOptions, cancel: &CancelFlag) -> Result<BuildReport> {
    let start = Instant::now();
    let (files, mut skipped) = collect_files(docs_root)?;
    tracing::info!(root = %docs_root.display(), files = files.len(), "collected documents");

    let (index, unreadable) = index_files(&files, options, cancel)?;
    skipped.extend(unreadable);

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let meta = write_index(index_dir, &index, &created_at, cancel)?;

    let elapsed = start.elapsed();
    tracing::info!(
        num_docs = meta.num_docs,
        num_terms = meta.num_terms,
        skipped = skipped.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        output = %index_dir.display(),
        "index build complete"
    );
    Ok(BuildReport { num_docs: meta.num_docs, num_terms: meta.num_terms, skipped, elapsed })
}

use anyhow::Result;
use quarry_core::persist::DiskIndex;
use quarry_core::query::{Operator, QueryParser};
use quarry_core::search::{Scoring, Searcher, TopDocs};
use quarry_core::tokenizer::Analyzer;
use quarry_core::{CancelFlag, IndexReader, QuarryError, CONTENTS_FIELD};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Field bare query terms are matched against.
    pub field: String,
    pub hits_per_page: usize,
    pub default_operator: Operator,
    pub scoring: Scoring,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            field: CONTENTS_FIELD.to_string(),
            hits_per_page: 25,
            default_operator: Operator::Or,
            scoring: Scoring::Frequency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line_no: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct SessionReport {
    /// Lines that were parsed and evaluated.
    pub queries: usize,
    pub malformed: Vec<LineError>,
    /// Lines whose evaluation hit an index read error.
    pub failed: Vec<LineError>,
    /// Results rendered with a placeholder because their file could not be read.
    pub unavailable: usize,
    pub cancelled: bool,
}

/// One pass over a queries file against an open index.
///
/// Errors local to a line (parse failures, unreadable result files) are
/// reported and the session moves on; only I/O on the queries input or the
/// output sink ends it early.
pub struct SearchSession<R: IndexReader = DiskIndex> {
    reader: R,
    parser: QueryParser,
    options: SearchOptions,
}

impl SearchSession<DiskIndex> {
    pub fn open(index_dir: impl AsRef<Path>, options: SearchOptions) -> quarry_core::Result<Self> {
        let index_dir = index_dir.as_ref();
        if options.field != CONTENTS_FIELD {
            return Err(QuarryError::index_open(
                index_dir,
                format!("field `{}` is not indexed, only `{CONTENTS_FIELD}` is searchable", options.field),
            ));
        }
        let reader = DiskIndex::open(index_dir)?;
        tracing::info!(index = %index_dir.display(), num_docs = reader.num_docs(), "search session opened");
        Ok(Self::with_reader(reader, options))
    }
}

impl<R: IndexReader> SearchSession<R> {
    /// Queries are analyzed with the same settings the index was built with.
    /// `options.field` must name the field documents were indexed under.
    pub fn with_reader(reader: R, options: SearchOptions) -> Self {
        let parser = QueryParser::new(options.field.clone(), Analyzer::new(reader.analyzer()))
            .with_default_operator(options.default_operator);
        Self { reader, parser, options }
    }

    pub async fn run_file<W: Write>(&self, queries: &Path, out: &mut W, cancel: &CancelFlag) -> Result<SessionReport> {
        let file = tokio::fs::File::open(queries)
            .await
            .map_err(|e| QuarryError::io(queries, e))?;
        self.run(BufReader::new(file), out, cancel).await
    }

    pub async fn run<I, W>(&self, input: I, out: &mut W, cancel: &CancelFlag) -> Result<SessionReport>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut report = SessionReport::default();
        let mut lines = input.lines();
        let mut line_no = 0;
        loop {
            if cancel.is_cancelled() {
                tracing::info!(line_no, "search cancelled");
                report.cancelled = true;
                break;
            }
            let Some(line) = lines.next_line().await? else { break };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            self.run_line(line_no, &line, out, &mut report).await?;
        }
        out.flush()?;
        tracing::info!(
            queries = report.queries,
            malformed = report.malformed.len(),
            failed = report.failed.len(),
            unavailable = report.unavailable,
            "search session closed"
        );
        Ok(report)
    }

    async fn run_line<W: Write>(&self, line_no: usize, line: &str, out: &mut W, report: &mut SessionReport) -> Result<()> {
        let query = match self.parser.parse(line) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(line_no, error = %e, "malformed query");
                writeln!(out, "Malformed query on line {line_no}: {e}")?;
                report.malformed.push(LineError { line_no, message: e.to_string() });
                return Ok(());
            }
        };
        writeln!(out, "Searching for: {}", query.display(&self.options.field))?;

        let searcher = Searcher::new(&self.reader, self.options.field.as_str()).with_scoring(self.options.scoring);
        let top = match searcher.search(&query, self.options.hits_per_page) {
            Ok(top) => top,
            Err(e) => {
                tracing::warn!(line_no, error = %e, "query evaluation failed");
                writeln!(out, "Search failed on line {line_no}: {e}")?;
                report.failed.push(LineError { line_no, message: e.to_string() });
                return Ok(());
            }
        };
        report.queries += 1;
        tracing::debug!(line_no, total_hits = top.total_hits, returned = top.hits.len(), "query evaluated");
        writeln!(out, "{} total matching documents", top.total_hits)?;
        self.render(&top, out, report).await
    }

    async fn render<W: Write>(&self, top: &TopDocs, out: &mut W, report: &mut SessionReport) -> Result<()> {
        let paths: Vec<String> = top
            .hits
            .iter()
            .map(|h| self.reader.doc(h.doc_id).map(|d| d.path.clone()).unwrap_or_default())
            .collect();
        let contents = load_contents(&paths).await;
        for (rank, (path, content)) in paths.iter().zip(contents).enumerate() {
            let body = match content {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "result content unavailable");
                    report.unavailable += 1;
                    format!("[content unavailable: {}]\n", unavailable_reason(&e))
                }
            };
            writeln!(out, "{}. {}\n{}", rank + 1, path, body)?;
        }
        Ok(())
    }
}

fn unavailable_reason(e: &QuarryError) -> String {
    match e {
        QuarryError::ContentUnavailable { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Read every result file concurrently. Output order follows `paths`.
async fn load_contents(paths: &[String]) -> Vec<quarry_core::Result<String>> {
    let mut tasks = JoinSet::new();
    for (i, path) in paths.iter().enumerate() {
        let path = PathBuf::from(path);
        tasks.spawn(async move { (i, read_content(path).await) });
    }
    let mut slots: Vec<Option<quarry_core::Result<String>>> = (0..paths.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((i, res)) => slots[i] = Some(res),
            Err(e) => tracing::warn!(error = %e, "content loader task failed"),
        }
    }
    slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| {
                Err(QuarryError::ContentUnavailable { path: path.into(), reason: "loader task failed".into() })
            })
        })
        .collect()
}

/// Current file content, one `\n`-terminated line per source line.
async fn read_content(path: PathBuf) -> quarry_core::Result<String> {
    if path.as_os_str().is_empty() {
        return Err(QuarryError::ContentUnavailable { path, reason: "no stored path".into() });
    }
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) => return Err(QuarryError::ContentUnavailable { path, reason: e.to_string() }),
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut content = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        content.push_str(line);
        content.push('\n');
    }
    Ok(content)
}

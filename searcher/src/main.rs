use anyhow::Result;
use clap::{Parser, ValueEnum};
use quarry_core::query::Operator;
use quarry_core::search::Scoring;
use quarry_core::{CancelFlag, CONTENTS_FIELD};
use searcher::{SearchOptions, SearchSession};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, ValueEnum)]
enum OperatorArg {
    Or,
    And,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScoringArg {
    Frequency,
    Tfidf,
}

#[derive(Parser)]
#[command(name = "searcher")]
#[command(about = "Run every line of a queries file against an index", long_about = None)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Newline-delimited queries file
    #[arg(long)]
    queries: PathBuf,
    /// Default field for query terms. Only `contents` is indexed.
    #[arg(long, default_value = CONTENTS_FIELD)]
    field: String,
    /// Results shown per query
    #[arg(long, default_value_t = 25)]
    hits: usize,
    /// Operator between clauses without an explicit AND/OR
    #[arg(long, value_enum, default_value_t = OperatorArg::Or)]
    operator: OperatorArg,
    #[arg(long, value_enum, default_value_t = ScoringArg::Frequency)]
    scoring: ScoringArg,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let args = Args::parse();
    let options = SearchOptions {
        field: args.field,
        hits_per_page: args.hits,
        default_operator: match args.operator {
            OperatorArg::Or => Operator::Or,
            OperatorArg::And => Operator::And,
        },
        scoring: match args.scoring {
            ScoringArg::Frequency => Scoring::Frequency,
            ScoringArg::Tfidf => Scoring::TfIdf,
        },
    };
    let session = SearchSession::open(&args.index, options)?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current query");
            on_interrupt.cancel();
        }
    });

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let report = session.run_file(&args.queries, &mut out, &cancel).await?;
    out.flush()?;
    if !report.malformed.is_empty() || report.unavailable > 0 {
        eprintln!(
            "{} malformed queries, {} results without content",
            report.malformed.len(),
            report.unavailable
        );
    }
    Ok(())
}

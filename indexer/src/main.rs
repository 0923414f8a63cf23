use anyhow::Result;
use clap::{Parser, Subcommand};
use indexer::{build_index, BuildOptions};
use quarry_core::tokenizer::AnalyzerConfig;
use quarry_core::CancelFlag;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build an inverted index over a directory of text files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every regular file under a directory
    Build {
        /// Document root, walked recursively
        #[arg(long)]
        docs: PathBuf,
        /// Output index directory (replaced on success)
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Apply English stemming to terms
        #[arg(long, default_value_t = false)]
        stem: bool,
        /// Drop English stop words
        #[arg(long, default_value_t = false)]
        stopwords: bool,
        /// Worker threads for reading and analysis
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { docs, index, stem, stopwords, threads } => {
            let options = BuildOptions { analyzer: AnalyzerConfig { stopwords, stem }, threads };
            let report = build_index(&docs, &index, &options, &CancelFlag::new())?;
            for s in &report.skipped {
                eprintln!("skipped {}: {}", s.path.display(), s.reason);
            }
            println!("Time taken to index: {} milliseconds", report.elapsed.as_millis());
            Ok(())
        }
    }
}

//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Seed and query a book catalog from line-delimited JSON dumps.
///
/// Imports are resumable: each job records how many input lines it has
/// committed and continues from there on the next run.
#[derive(Parser, Debug)]
#[command(name = "bookshelf")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SQLite database file (default: data.db)
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Directory holding checkpoint files (default: current directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and apply the schema
    Init,

    /// Import a dump or enrich books with thumbhashes
    #[command(subcommand)]
    Seed(SeedJob),

    /// List books matching filters
    Search(SearchArgs),

    /// Show one book with its authors as JSON
    Show {
        /// Book id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SeedJob {
    /// Import authors.json
    Authors(ImportArgs),
    /// Import books.json and link books to already imported authors
    Books(ImportArgs),
    /// Compute thumbhashes for book cover images listed in books.json
    Thumbhash(ThumbhashArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ImportArgs {
    /// Line-delimited JSON input file
    pub file: PathBuf,

    /// Expected number of lines, for progress; counted from the file if omitted
    #[arg(long)]
    pub total: Option<u64>,

    /// Records per transaction (1-100000)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100_000))]
    pub batch_size: Option<u32>,

    /// Discard the saved checkpoint and start from the first line
    #[arg(long)]
    pub restart: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ThumbhashArgs {
    #[command(flatten)]
    pub import: ImportArgs,

    /// Maximum concurrent image fetches (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Per-image request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SearchArgs {
    /// Page number, starting at 1
    #[arg(long)]
    pub page: Option<u32>,

    /// Latest publication year (clamped to 1950-2023)
    #[arg(long)]
    pub year: Option<i64>,

    /// Minimum average rating
    #[arg(long)]
    pub rating: Option<f64>,

    /// Language code; `en` matches eng, en-US and en-GB
    #[arg(long)]
    pub language: Option<String>,

    /// Maximum page count (capped at 1000)
    #[arg(long)]
    pub pages: Option<i64>,

    /// Words that must all appear in the title
    #[arg(long)]
    pub query: Option<String>,

    /// Comma-separated ISBNs
    #[arg(long)]
    pub isbn: Option<String>,
}

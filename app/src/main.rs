#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;

use clap::{Parser, Subcommand};
use command::{
    AddInput, AddStrategy, AskInput, AskStrategy, CommandStrategy, InfoStrategy, InitStrategy,
    SyncStrategy, VersionStrategy,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "scholar")]
#[command(about = "Research assistant over a personal document corpus", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init,
    /// Upload local documents missing from the remote corpus
    Sync,
    /// Store a local file and upload it
    Add {
        /// File to add
        path: PathBuf,
    },
    /// Ask a question in a conversation
    Ask {
        /// Local conversation id, created on first use
        #[arg(short, long)]
        conversation: String,

        /// Summarize this document instead of asking a question
        #[arg(short, long)]
        summary: Option<String>,

        /// Address the answer to this user id
        #[arg(short, long)]
        user: Option<String>,

        /// Question text
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Show configuration and storage status
    Info,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Sync => SyncStrategy.execute(()).await,
        Commands::Add { path } => AddStrategy.execute(AddInput { path }).await,
        Commands::Ask {
            conversation,
            summary,
            user,
            question,
        } => {
            AskStrategy
                .execute(AskInput {
                    conversation,
                    summary,
                    user,
                    question: question.join(" "),
                })
                .await
        }
        Commands::Info => InfoStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}

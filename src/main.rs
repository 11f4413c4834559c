use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use testsmith::cli::{self, ExecutionArgs};

#[derive(Parser)]
#[command(name = "testsmith", version)]
#[command(about = "Generate unit tests with an LLM, then repair, stage and run them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and execute unit tests for one or more source files
    Generate {
        /// Source files to test
        #[arg(required = true, num_args = 1..)]
        files: Vec<String>,

        /// Language label (python, java, ...). Detected from the extension if not specified.
        #[arg(long)]
        language: Option<String>,

        /// Override LLM model (e.g., "gpt-5.2", "claude-sonnet-4-5-20250929")
        #[arg(long)]
        model: Option<String>,

        /// Override LLM provider (groq, openai, openai-compatible, anthropic)
        #[arg(long)]
        provider: Option<String>,

        /// Use mock LLM client for testing
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        args: ExecutionArgs,
    },

    /// Repair, stage and execute an existing test file against its source
    Run {
        /// Source file under test
        source: String,

        /// Test file to run
        test: String,

        /// Language label. Detected from the source extension if not specified.
        #[arg(long)]
        language: Option<String>,

        #[command(flatten)]
        args: ExecutionArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            files,
            language,
            model,
            provider,
            dry_run,
            args,
        } => {
            cli::generate::run(files, language, model, provider, dry_run, args).await?;
        }
        Commands::Run {
            source,
            test,
            language,
            args,
        } => {
            cli::run::run(source, test, language, args).await?;
        }
    }

    Ok(())
}

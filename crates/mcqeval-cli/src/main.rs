//! The `mcqeval` command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "mcqeval",
    version,
    about = "Multiple-choice question eval runner for LLM answer services"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every stored question (or a random sample with --quick)
    Run {
        /// Sample up to `quick_sample_size` questions per domain
        #[arg(long)]
        quick: bool,

        /// Provider name from the config (defaults to `default_provider`)
        #[arg(long)]
        provider: Option<String>,

        /// Model to request (defaults to `default_model`)
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Question store directory (overrides `store_dir`)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print per-domain accuracy and latency
    Analyze {
        /// Question store directory
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load question-set TOML files into the store
    Import {
        /// Path to a question-set file or directory
        #[arg(long)]
        questions: PathBuf,

        /// Question store directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate question-set TOML files
    Validate {
        /// Path to a question-set file or directory
        #[arg(long)]
        questions: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example question set
    Init,
}

#[tokio::main]
async fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "mcqeval=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            quick,
            provider,
            model,
            config,
            store,
        } => commands::run::execute(quick, provider, model, config, store).await,
        Commands::Analyze {
            store,
            format,
            config,
        } => commands::analyze::execute(store, format, config).await,
        Commands::Import {
            questions,
            store,
            config,
        } => commands::import::execute(questions, store, config).await,
        Commands::Validate { questions } => commands::validate::execute(questions),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

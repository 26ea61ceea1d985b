//! vPGM Control - CLI for vPGM inference over ScienceQA questions
//!
//! Runs everything locally: no daemon is needed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vpgm_common::Config;
use vpgmctl::{commands, Session};

// Version is embedded at build time
const VERSION: &str = env!("VPGM_VERSION");

#[derive(Parser)]
#[command(name = "vpgmctl")]
#[command(about = "vPGM Explorer - verbalized PGM inference for ScienceQA", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Config file (default: $VPGM_CONFIG, /etc/vpgm/config.toml, ./vpgm.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Template id (default: templates.default_id from the config)
    #[arg(long, global = true)]
    template: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List templates in the template document
    Templates,

    /// List questions
    List {
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Case-insensitive substring of the question text
        #[arg(long)]
        search: Option<String>,

        /// Include questions that come with an image
        #[arg(long)]
        include_images: bool,
    },

    /// Print the skeleton built for a question
    Skeleton {
        /// Question id (idx_N or the record's own id)
        id: String,
    },

    /// Print the prompt the oracle would receive for a question
    Prompt { id: String },

    /// Build skeletons for every question
    Skeletons {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Run vPGM inference for one question
    Infer {
        id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Run vPGM inference for several questions, stopping at the first failure
    Batch {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Validate a saved oracle reply against the template
    Check {
        /// File holding the raw reply text
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Logs go to stderr; stdout carries JSON and prompts
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let session = Session::new(config, cli.template);

    match cli.command {
        Commands::Templates => commands::templates(&session),
        Commands::List {
            page,
            limit,
            search,
            include_images,
        } => commands::list(&session, page, limit, search.as_deref(), include_images),
        Commands::Skeleton { id } => commands::skeleton(&session, &id),
        Commands::Prompt { id } => commands::prompt(&session, &id),
        Commands::Skeletons { output } => commands::skeletons(&session, output.as_deref()),
        Commands::Infer { id, output } => {
            let oracle = session.config.oracle.build()?;
            commands::infer(&session, &oracle, &id, output.as_deref())
        }
        Commands::Batch { ids, output } => {
            let oracle = session.config.oracle.build()?;
            commands::batch(&session, &oracle, &ids, output.as_deref())
        }
        Commands::Check { file } => commands::check(&session, &file),
    }
}

//! adaptest CLI: item bank validation, simulation and scoring.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "Computerized adaptive testing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate item bank TOML files
    Validate {
        /// Path to item bank file or directory
        #[arg(long)]
        item_bank: PathBuf,

        /// Content locale to load (falls back to "en" per item)
        #[arg(long)]
        locale: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Simulate adaptive sessions at known abilities
    Simulate {
        /// Path to item bank file
        #[arg(long)]
        item_bank: PathBuf,

        /// True abilities to simulate (comma-separated)
        #[arg(long, default_value = "-2,-1,0,1,2", allow_hyphen_values = true)]
        thetas: String,

        /// Sessions per ability
        #[arg(long, default_value = "100")]
        replications: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Estimation method override: eap, mle
        #[arg(long)]
        method: Option<String>,

        /// Write every finished session as JSON into this directory
        #[arg(long)]
        save_sessions: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Content locale to load
        #[arg(long)]
        locale: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score a saved session
    Score {
        /// Session JSON file
        #[arg(long)]
        session: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Also save the result JSON here
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file whose [scoring] section replaces the session's
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two assessment results
    Compare {
        /// Baseline result JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current result JSON
        #[arg(long)]
        current: PathBuf,

        /// Exit code 1 if ability changed reliably
        #[arg(long)]
        fail_on_change: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config and example item bank
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adaptest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            item_bank,
            locale,
            config,
        } => commands::validate::execute(item_bank, locale, config),
        Commands::Simulate {
            item_bank,
            thetas,
            replications,
            seed,
            method,
            save_sessions,
            format,
            locale,
            config,
        } => commands::simulate::execute(commands::simulate::SimulateArgs {
            item_bank,
            thetas,
            replications,
            seed,
            method,
            save_sessions,
            format,
            locale,
            config,
        }),
        Commands::Score {
            session,
            format,
            output,
            config,
        } => commands::score::execute(session, format, output, config),
        Commands::Compare {
            baseline,
            current,
            fail_on_change,
            format,
        } => commands::compare::execute(baseline, current, fail_on_change, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

//! Waypost CLI — run, resume and inspect pathway runs.
//!
//! Reuses the same core domain logic (waypost-core) that powers an
//! embedded Pathfinder agent: pathways are loaded from YAML, runs and
//! steps are persisted in a local SQLite pouch.

mod commands;

use clap::{Parser, Subcommand};

/// Waypost CLI — durable pathway execution
#[derive(Parser)]
#[command(name = "waypost", version, about = "Waypost CLI — durable pathway execution")]
pub struct Cli {
    /// Path to the SQLite database file (defaults to the user data dir)
    #[arg(long, env = "WAYPOST_DB_PATH")]
    db: Option<String>,

    /// Plaza directory URL for remote practice resolution
    #[arg(long, env = "WAYPOST_PLAZA_URL")]
    plaza_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pathway from a YAML file
    Run {
        /// Path to the pathway YAML file
        file: String,
        /// Run inputs as key=value pairs (values parsed as JSON when possible)
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
        /// Days the run record is kept before it is eligible for cleanup
        #[arg(long, default_value_t = 0)]
        ttl: i64,
    },
    /// Resume a persisted pathway run
    Resume {
        /// PathRun ID to resume
        pathrun_id: String,
        /// Extra inputs merged over the persisted ones
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
    },
    /// List persisted pathway runs
    Runs,
    /// Show the step history of a run
    Steps {
        /// PathRun ID to inspect
        pathrun_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost_core=warn,waypost_cli=info".into()),
        )
        .init();

    let pouch = commands::init_pouch(cli.db.as_deref()).await;

    let result = match cli.command {
        Commands::Run { file, inputs, ttl } => {
            commands::run::run(&pouch, &file, &inputs, ttl, cli.plaza_url.as_deref()).await
        }
        Commands::Resume { pathrun_id, inputs } => {
            commands::resume::run(&pouch, &pathrun_id, &inputs, cli.plaza_url.as_deref()).await
        }
        Commands::Runs => commands::runs::list(&pouch).await,
        Commands::Steps { pathrun_id } => commands::steps::list(&pouch, &pathrun_id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

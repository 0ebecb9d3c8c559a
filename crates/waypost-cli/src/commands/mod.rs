//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the waypost-core domain logic through a shared `Pouch`.

pub mod resume;
pub mod run;
pub mod runs;
pub mod steps;

use std::sync::Arc;

use async_trait::async_trait;

use waypost_core::dispatch::{HttpCaller, PracticeCaller, ResponseEnvelope};
use waypost_core::error::EngineError;
use waypost_core::models::VarMap;
use waypost_core::plaza::{AgentListing, HttpPlaza, Plaza};
use waypost_core::practice::PracticeRegistry;
use waypost_core::{Database, Pathfinder, Pouch};

/// Agent identity the CLI runs under.
pub const CLI_AGENT_ID: &str = "waypost-cli";

/// Open the pouch at `db_path`, falling back to
/// `<user data dir>/waypost/waypost.db`.
pub async fn init_pouch(db_path: Option<&str>) -> Pouch {
    let path = match db_path {
        Some(p) => std::path::PathBuf::from(p),
        None => {
            let dir = dirs::data_local_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join("waypost");
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create data directory '{}': {}", dir.display(), e);
                std::process::exit(1);
            }
            dir.join("waypost.db")
        }
    };

    let db = Database::open(&path.to_string_lossy()).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", path.display(), e);
        std::process::exit(1);
    });

    Pouch::new(db)
}

/// Build a Pathfinder over `pouch`. Without a plaza URL the resolver is
/// local-only: no agents are listed and remote dispatch is rejected.
pub fn init_pathfinder(pouch: &Pouch, plaza_url: Option<&str>) -> Pathfinder {
    let registry = Arc::new(PracticeRegistry::new());
    match plaza_url {
        Some(url) => Pathfinder::new(
            CLI_AGENT_ID,
            pouch.clone(),
            registry,
            Arc::new(HttpPlaza::new(url)),
            Arc::new(HttpCaller::new(url)),
        ),
        None => Pathfinder::new(
            CLI_AGENT_ID,
            pouch.clone(),
            registry,
            Arc::new(EmptyPlaza),
            Arc::new(NoRemoteCaller),
        ),
    }
}

/// Parse `key=value` input pairs; values that parse as JSON are kept
/// typed, anything else becomes a string.
pub fn parse_inputs(pairs: &[String]) -> Result<VarMap, String> {
    let mut inputs = VarMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid input '{}', expected key=value", pair))?;
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        inputs.insert(key.to_string(), parsed);
    }
    Ok(inputs)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Plaza that lists no agents, for runs without a directory server.
struct EmptyPlaza;

#[async_trait]
impl Plaza for EmptyPlaza {
    async fn list_active_agents(&self) -> Result<Vec<AgentListing>, EngineError> {
        Ok(Vec::new())
    }
}

/// Caller used when no plaza URL is configured. The resolver never
/// selects a remote target in that case, so reaching this is a bug.
struct NoRemoteCaller;

#[async_trait]
impl PracticeCaller for NoRemoteCaller {
    async fn call(
        &self,
        address: &str,
        _practice: &str,
        _payload: &VarMap,
    ) -> Result<Vec<ResponseEnvelope>, EngineError> {
        Err(EngineError::Dispatch(format!(
            "No plaza configured, cannot reach agent {}",
            address
        )))
    }
}

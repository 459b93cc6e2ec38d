pub mod check_config;
pub mod history;
pub mod resolve;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use storage::{InMemoryConfigStore, StoreSeed};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "rcctl",
    author,
    version,
    about = "rcctl - inspect layered routing configuration",
    long_about = "Resolves effective routing configuration and audit history from a seed \
                  snapshot of organization, project and provider rows, and checks client \
                  settings files."
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "RC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print the effective configuration of a project")]
    Resolve(resolve::ResolveArgs),

    #[command(about = "Print an organization's merged audit history")]
    History(history::HistoryArgs),

    #[command(about = "Load, merge and validate a client settings file")]
    CheckConfig(check_config::CheckConfigArgs),
}

/// Build an in-memory store from a YAML or TOML seed file.
pub fn load_store(path: &Path) -> Result<Arc<InMemoryConfigStore>> {
    let seed: StoreSeed = config::load_document(path)
        .with_context(|| format!("Failed to read seed {}", path.display()))?;
    debug!(
        "Loaded seed {}: {} organizations, {} projects, {} providers",
        path.display(),
        seed.organizations.len(),
        seed.projects.len(),
        seed.providers.len()
    );
    let store = InMemoryConfigStore::from_seed(seed)
        .with_context(|| format!("Seed {} was rejected", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use config::ObservabilityConfig;

    #[test]
    fn test_log_level_default_matches_settings_default() {
        let command = Cli::command();
        let default = command
            .get_arguments()
            .find(|arg| arg.get_id() == "log_level")
            .and_then(|arg| arg.get_default_values().first())
            .and_then(|value| value.to_str())
            .map(str::to_string);

        assert_eq!(default, Some(ObservabilityConfig::default().logging_level));
    }
}

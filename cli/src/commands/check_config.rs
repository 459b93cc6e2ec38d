use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use config::{ClientConfig, ConfigOverrides};

use tracing::{debug, warn};

use crate::output;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Client settings file (.yaml, .yml or .toml)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Ignore RC_* environment overrides
    #[arg(long)]
    pub no_env: bool,

    /// Print the merged settings as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CheckConfigArgs) -> Result<()> {
    let from_file = config::load_from_file(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let from_env = if args.no_env {
        debug!("Ignoring RC_* environment overrides");
        ConfigOverrides::default()
    } else {
        config::load_from_env().map_err(|e| anyhow!("Invalid environment override: {e}"))?
    };

    let merged = config::merge_configs(
        ClientConfig::default(),
        from_file,
        "file",
        from_env,
        "env",
        None,
        "cli",
    );

    if let Err(errors) = config::validate(&merged) {
        warn!("Merged settings from {} failed validation", args.file.display());
        output::error(&format!("{} is invalid", args.file.display()));
        for (field, _) in errors.errors() {
            eprintln!("  - {field}");
        }
        bail!("Configuration validation failed: {errors}");
    }

    if args.json {
        return output::json(&merged);
    }

    output::success(&format!("{} is valid", args.file.display()));
    output::field("Stale time", &format!("{}ms", merged.cache.stale_time_ms));
    output::field(
        "Refetch on invalidate",
        &merged.cache.refetch_on_invalidate.to_string(),
    );
    output::field(
        "Event buffer",
        &merged.events.channel_capacity.to_string(),
    );
    output::field("Log level", &merged.observability.logging_level);
    Ok(())
}

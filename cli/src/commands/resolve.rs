use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cache::QueryFetcher;
use clap::Args;
use console::ConfigQueryFetcher;
use rc_core::{CacheKey, EffectiveConfig, OrganizationId, ProjectId};

use crate::output;

#[derive(Args)]
pub struct ResolveArgs {
    /// Seed snapshot (.yaml, .yml or .toml)
    #[arg(long, value_name = "FILE")]
    pub seed: PathBuf,

    /// Organization id
    #[arg(long = "org")]
    pub organization: String,

    /// Project id
    #[arg(long)]
    pub project: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ResolveArgs) -> Result<()> {
    let Some(organization_id) = OrganizationId::new(&args.organization) else {
        bail!("Invalid organization id {:?}", args.organization);
    };
    let Some(project_id) = ProjectId::new(&args.project) else {
        bail!("Invalid project id {:?}", args.project);
    };

    let store = super::load_store(&args.seed)?;
    let fetcher = ConfigQueryFetcher::new(store);
    let value = fetcher
        .fetch(&CacheKey::effective_config(&organization_id, &project_id))
        .await
        .context("Failed to resolve effective configuration")?;

    if args.json {
        return output::json(&value);
    }

    let effective: EffectiveConfig = serde_json::from_value(value)?;
    print_effective(&organization_id, &project_id, &effective);
    Ok(())
}

fn print_effective(
    organization_id: &OrganizationId,
    project_id: &ProjectId,
    effective: &EffectiveConfig,
) {
    output::header("Effective configuration");
    println!();
    output::field("Organization", organization_id.as_str());
    output::field("Project", project_id.as_str());
    output::field("Source", &effective.source.to_string());
    if let Some(config_id) = &effective.config_id {
        output::field("Config", config_id);
    }
    output::field("Enabled", &effective.settings.enabled.to_string());

    match &effective.settings.model_router_config {
        Some(router) => {
            output::field("Cost bias", &router.cost_bias.to_string());
            output::field(
                "Semantic cache",
                if router.semantic_cache.enabled {
                    "on"
                } else {
                    "off"
                },
            );
        }
        None => output::field("Model router", "unset"),
    }

    match &effective.settings.fallback_config {
        Some(fallback) => output::field(
            "Fallback",
            &format!(
                "{:?}, {}ms timeout, {} retries",
                fallback.mode, fallback.timeout_ms, fallback.max_retries
            ),
        ),
        None => output::field("Fallback", "unset"),
    }
}

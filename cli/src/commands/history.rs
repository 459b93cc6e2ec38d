use std::path::PathBuf;

use anyhow::{Result, bail};
use audit::HistoryPage;
use clap::Args;
use rc_core::{ConfigRpc, HistorySource, ORGANIZATION_PARAM, OrganizationId, ResourceKind, ResourceParams};

use tracing::debug;

use crate::output;

#[derive(Args)]
pub struct HistoryArgs {
    /// Seed snapshot (.yaml, .yml or .toml)
    #[arg(long, value_name = "FILE")]
    pub seed: PathBuf,

    /// Organization id
    #[arg(long = "org")]
    pub organization: String,

    /// Show at most this many entries
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: HistoryArgs) -> Result<()> {
    let Some(organization_id) = OrganizationId::new(&args.organization) else {
        bail!("Invalid organization id {:?}", args.organization);
    };

    let store = super::load_store(&args.seed)?;
    let filter = ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str());
    let (config_rows, provider_rows) = tokio::try_join!(
        store.list(ResourceKind::ConfigHistory, &filter),
        store.list(ResourceKind::ProviderHistory, &filter),
    )?;

    let mut entries = audit::merge_projected(&[
        HistoryPage::new(HistorySource::Config, config_rows),
        HistoryPage::new(HistorySource::Provider, provider_rows),
    ]);
    if entries.len() > args.limit {
        debug!("Truncating {} history entries to {}", entries.len(), args.limit);
    }
    entries.truncate(args.limit);

    if args.json {
        return output::json(&entries);
    }

    output::header(&format!("History of {organization_id}"));
    println!();
    for entry in &entries {
        println!(
            "  {:>15}  {:<8} {:<20} {} by {}",
            entry.changed_at, entry.action, entry.entity_type, entry.entity_id, entry.changed_by
        );
    }
    Ok(())
}

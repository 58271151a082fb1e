//! `keymirror inspect`: read one resource's fields straight from the store.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;

use keymirror_core::ResourceIdentity;
use keymirror_daemon::{inspect_blocking, DaemonConfig};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Resource as `namespace/name`.
    pub resource: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InspectArgs {
    pub fn run(self, config: &DaemonConfig) -> Result<()> {
        let identity: ResourceIdentity = self
            .resource
            .parse()
            .with_context(|| format!("invalid resource '{}'", self.resource))?;
        let fields: BTreeMap<String, String> = inspect_blocking(config, &identity)
            .with_context(|| format!("failed to read {identity} from store"))?
            .into_iter()
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&fields).context("failed to render fields JSON")?
            );
            return Ok(());
        }

        if fields.is_empty() {
            println!("{identity}: no fields in store");
            return Ok(());
        }
        for (field, value) in &fields {
            println!("{field}={value}");
        }
        Ok(())
    }
}

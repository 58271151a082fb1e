use anyhow::{Context, Result};

use keymirror_daemon::DaemonConfig;

pub fn run(config: &DaemonConfig) -> Result<()> {
    let yaml = config.to_yaml().context("failed to render config")?;
    print!("{yaml}");
    Ok(())
}

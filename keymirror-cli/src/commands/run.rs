//! `keymirror run`: foreground daemon.

use anyhow::{Context, Result};

use keymirror_daemon::{start_blocking, DaemonConfig};

pub fn run(config: DaemonConfig) -> Result<()> {
    start_blocking(config).context("daemon exited with error")
}

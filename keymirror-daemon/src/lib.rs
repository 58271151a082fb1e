//! keymirror daemon: manifest watcher, file-backed store wiring and the
//! process runtime that drives the synchronizer.

pub mod config;
mod error;
pub mod manifest;
pub mod paths;
mod runtime;

pub use config::DaemonConfig;
pub use error::DaemonError;
pub use manifest::{Manifest, ManifestApplier, ManifestIndex, ManifestSource};
pub use runtime::{inspect_blocking, open_store, run, start_blocking, Daemon};

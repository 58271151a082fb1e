use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yaml";
pub const MANIFESTS_DIR: &str = "manifests";
pub const STORE_DIR: &str = "store";

pub fn keymirror_root(home: &Path) -> PathBuf {
    home.join(".keymirror")
}

pub fn config_path(home: &Path) -> PathBuf {
    keymirror_root(home).join(CONFIG_FILE)
}

pub fn manifests_dir(home: &Path) -> PathBuf {
    keymirror_root(home).join(MANIFESTS_DIR)
}

pub fn store_dir(home: &Path) -> PathBuf {
    keymirror_root(home).join(STORE_DIR)
}

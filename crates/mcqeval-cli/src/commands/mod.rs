pub mod analyze;
pub mod import;
pub mod init;
pub mod list_models;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Result;

use mcqeval_providers::{load_config_from, McqevalConfig};

/// Load the config and pick the store directory, preferring `--store`.
pub(crate) fn load_with_store(
    config_path: Option<&Path>,
    store: Option<PathBuf>,
) -> Result<(McqevalConfig, PathBuf)> {
    let config = load_config_from(config_path)?;
    let store_dir = store.unwrap_or_else(|| config.store_dir.clone());
    Ok((config, store_dir))
}

//! One-shot staging directory cleanup.

use crate::config::Config;
use crate::media::TempStore;

/// Delete every file in the configured staging directory.
pub async fn run_sweep_command(config: &Config) -> anyhow::Result<()> {
    let store = TempStore::new(&config.storage.temp_dir);
    let removed = store.sweep_all().await?;
    println!(
        "Removed {} file(s) from {}",
        removed,
        store.dir().display()
    );
    Ok(())
}

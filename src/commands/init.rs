use anyhow::{Context, Result};
use pageharvest::config::Config;
use std::path::PathBuf;

pub fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let content = toml::to_string_pretty(&Config::default())
        .context("Failed to serialize default configuration")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file '{}'", path.display()))?;

    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

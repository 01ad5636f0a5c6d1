mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::Context;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::info!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Hub token from `HUGGINGFACE_TOKEN`, falling back to `HF_TOKEN`.
    #[must_use]
    pub fn hub_token() -> Option<String> {
        ["HUGGINGFACE_TOKEN", "HF_TOKEN"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|t| !t.trim().is_empty()))
    }
}

use std::path::{Path, PathBuf};

#[cfg(not(feature = "candle"))]
use anyhow::bail;
use anyhow::Context;
use coderag_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let config_path = resolve_config_path(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    let hub_token = Config::hub_token();
    if hub_token.is_none() {
        tracing::warn!("no HUGGINGFACE_TOKEN or HF_TOKEN set, gated models will fail to download");
    }

    run(&config, hub_token.as_deref(), &config_path).await
}

#[cfg(feature = "candle")]
async fn run(config: &Config, hub_token: Option<&str>, config_path: &Path) -> anyhow::Result<()> {
    use coderag_core::bootstrap::{create_embedder, create_provider, create_store};

    tracing::info!("using config {}", config_path.display());
    let embedder = create_embedder(config, hub_token)?;
    let provider = create_provider(config, hub_token)?;
    let store = create_store(config)?;

    let output = coderag_core::run(config, &provider, embedder, store).await?;
    tracing::info!(
        converted = output.conversion.converted,
        chunks = output.chunk_count,
        retrieved = output.results.len(),
        "pipeline finished"
    );
    Ok(())
}

#[cfg(not(feature = "candle"))]
async fn run(_config: &Config, _hub_token: Option<&str>, config_path: &Path) -> anyhow::Result<()> {
    bail!(
        "coderag was built without the candle feature, no model backend for {}",
        config_path.display()
    )
}

fn resolve_config_path(args: impl IntoIterator<Item = String>) -> PathBuf {
    let args: Vec<String> = args.into_iter().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("CODERAG_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

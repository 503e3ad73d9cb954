use anyhow::Result;
use kube::Client;
use tracing::info;

mod config;
mod engine;
mod error;
mod parsing;
mod sources;
mod types;

use config::load_config;
use engine::OptimizationEngine;
use sources::{KubeMetricsSource, KubeObjectSource};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!("scope = {:?}", cfg.scope);

    let client = Client::try_default().await?;
    let engine = OptimizationEngine::new(
        KubeObjectSource::new(client.clone()),
        KubeMetricsSource::new(client),
    );

    let summary = engine.summarize(&cfg.summary_params()).await?;
    if summary.degraded {
        info!(
            "report degraded: {}",
            summary.degraded_reason.as_deref().unwrap_or("unknown")
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

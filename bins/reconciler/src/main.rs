//! PSP reconciler.
//!
//! Loads the orchestrator configuration, copies the newest version of every
//! session between the primary and its secondaries, and exits non-zero if
//! anything could not be reconciled.

use anyhow::{Context, bail};
use psp_core::StorageProvider;
use psp_factory::create_orchestrator_from_config;
use psp_shared::{AppConfig, LoggingConfig, ProviderConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let ProviderConfig::Orchestrator(storage) = &config.storage else {
        bail!(
            "reconciliation needs storage.type = \"orchestrator\", found \"{}\"",
            config.storage.kind()
        );
    };

    let orchestrator = create_orchestrator_from_config(storage).await?;
    info!(
        primary = orchestrator.primary().name(),
        secondaries = orchestrator.secondaries().len(),
        "Starting reconciliation"
    );

    let report = orchestrator.sync_all().await?;
    orchestrator.drain().await;

    info!(
        pulled = report.pulled,
        pushed = report.pushed,
        unchanged = report.unchanged,
        failed = report.failed,
        skipped_providers = report.skipped_providers,
        "Reconciliation finished"
    );

    if !report.is_clean() {
        bail!(
            "{} sessions failed to reconcile, {} providers skipped",
            report.failed,
            report.skipped_providers
        );
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let fmt = if logging.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}

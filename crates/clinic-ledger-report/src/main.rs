use std::env;

use anyhow::{Context, Result};
use clinic_ledger_core::{LedgerConfig, LedgerService};
use clinic_ledger_report::{LedgerReport, ReportFormat, ENV_REPORT_FORMAT};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = LedgerConfig::from_env()?;
    let format = match env::var(ENV_REPORT_FORMAT) {
        Ok(raw) => raw.parse::<ReportFormat>()?,
        Err(_) => ReportFormat::default(),
    };

    let path = config.data_path.clone();
    let mut service = LedgerService::new(config);
    let loaded = service
        .load()
        .with_context(|| format!("failed to load ledger {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        loaded = loaded.loaded,
        deleted = loaded.deleted,
        skipped = loaded.skipped.len(),
        "ledger loaded"
    );

    let report = LedgerReport::collect(&service);
    println!("{}", report.render(format)?);

    Ok(())
}

/// Logs go to stderr so JSON output on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("clinic_ledger_core=info,clinic_ledger_report=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

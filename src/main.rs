use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use storemon::cli::{parse_args, print_help};
use storemon::config::Config;
use storemon::engine::reference_time;
use storemon::http::{self, default_workers, AppState};
use storemon::ingest::load_dir;
use storemon::jobs::new_report_id;
use storemon::orchestrator::run_report;
use storemon::report::write_report;
use storemon::source::ObservationSource;

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args().map_err(anyhow::Error::msg)?;

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storemon=info".parse()?),
        )
        .init();

    info!("storemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Data dir: {}", config.data_dir.display());
    info!("  Report dir: {}", config.report_dir.display());
    info!("  Default timezone: {}", config.default_tz);

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let (dataset, summaries) = load_dir(&config.data_dir)?;
    let rejected: usize = summaries.iter().map(|s| s.rejected.len()).sum();
    if rejected > 0 {
        warn!("{} input rows rejected", rejected);
    }
    let dataset = Arc::new(dataset);
    let now_override = args.now.or(config.now);

    if args.once {
        info!("Computing a single report (--once mode)");
        let now = reference_time(now_override, dataset.latest_timestamp());
        let outcome = run_report(Arc::clone(&dataset), now, config.default_tz, default_workers()).await;
        let path = write_report(&config.report_dir, &new_report_id(), &outcome)
            .context("Failed to write report")?;
        println!("{}", path.display());
        return Ok(());
    }

    let state = Arc::new(
        AppState::new(dataset, config.report_dir.clone(), config.default_tz).with_now(now_override),
    );
    let cancel = CancellationToken::new();
    let server = tokio::spawn(http::run_server(config.http_port, state, cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    cancel.cancel();

    if let Err(e) = server.await {
        error!("Report server task failed: {}", e);
    }

    Ok(())
}

use anyhow::Result;
use tracing::{info, warn};

use simbatch_runner::BatchOutcome;
use simbatch_runner::batch;
use simbatch_runner::config::ConfigManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from CLI and environment
    let config_manager = ConfigManager::from_cli_and_env()?;

    // Validate configuration
    config_manager.validate()?;

    // Initialize logging
    config_manager.init_logging()?;

    info!(
        "Starting simbatch in {:?} mode under {:?}",
        config_manager.app.mode, config_manager.run.output_root
    );

    match batch::run(&config_manager).await? {
        BatchOutcome::Dispatched(report) => {
            let summary = report.summary();
            if summary.failed() > 0 {
                warn!(
                    "{} scenarios failed; see failure.json in their directories",
                    summary.failed()
                );
            }
            info!("Batch complete: {}", summary);
            println!("{}", serde_json::to_string(&summary)?);
        }
        BatchOutcome::Collected(path) => {
            info!("Aggregate written to {:?}", path);
            println!("{}", path.display());
        }
    }

    Ok(())
}

//! Start the capture server.

use crate::capture::orchestrator::CaptureService;
use crate::config::RuntimeConfig;
use crate::renderer::chromium::ChromiumLauncher;
use crate::rest::{self, AppState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Launch the engine (shared mode), serve HTTP until Ctrl-C, then tear down.
pub async fn run(config: RuntimeConfig) -> Result<()> {
    info!(
        mode = %config.mode,
        deadline = ?config.race.deadline,
        signature = %config.signature,
        "starting Trace v{}",
        env!("CARGO_PKG_VERSION")
    );

    let launcher = Arc::new(ChromiumLauncher::new(
        config.chromium_path.clone(),
        config.launch_timeout,
    ));
    let service = Arc::new(CaptureService::from_config(&config, launcher)?);

    // In shared mode a launch failure stops us before the listener is bound.
    service
        .engines()
        .startup()
        .await
        .context("browser engine failed to start")?;

    let state = Arc::new(AppState::new(Arc::clone(&service)));
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
    };

    let result = rest::start(config.listen_addr(), state, shutdown).await;

    service.engines().shutdown().await;
    info!("Trace stopped");
    result
}

//! `trace capture <url>`: run one capture without starting the server.

use crate::capture::orchestrator::CaptureService;
use crate::config::RuntimeConfig;
use crate::renderer::chromium::ChromiumLauncher;
use anyhow::{bail, Result};
use std::sync::Arc;

/// Capture `url` once and print the JSON response to stdout.
pub async fn run(config: &RuntimeConfig, url: &str) -> Result<()> {
    let launcher = Arc::new(ChromiumLauncher::new(
        config.chromium_path.clone(),
        config.launch_timeout,
    ));
    let service = CaptureService::from_config(config, launcher)?;

    service.engines().startup().await?;
    let report = service.handle(Some(url)).await;
    service.engines().shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report.to_response())?);

    match report.outcome.error() {
        None => Ok(()),
        Some(err) => bail!("capture failed after {}: {err}", crate::capture::format_elapsed(report.elapsed)),
    }
}

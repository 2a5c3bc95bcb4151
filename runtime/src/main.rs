// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use trace_runtime::capture::lifecycle::LifecycleMode;
use trace_runtime::cli;
use trace_runtime::config::RuntimeConfig;

#[derive(Parser)]
#[command(
    name = "trace",
    about = "Trace: capture a page's API response from headless Chromium",
    version,
    after_help = "Run 'trace <command> --help' for details on each command.\nRun 'trace' with no command to start the server."
)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags that override environment configuration.
#[derive(Args, Default)]
struct Overrides {
    /// Port to listen on (env: PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Address to listen on (env: TRACE_HOST)
    #[arg(long, global = true)]
    host: Option<IpAddr>,

    /// Chromium executable (env: TRACE_CHROMIUM_PATH)
    #[arg(long, global = true)]
    chromium: Option<PathBuf>,

    /// Engine lifecycle: ephemeral or shared (env: TRACE_ENGINE_MODE)
    #[arg(long, global = true)]
    mode: Option<LifecycleMode>,

    /// Seconds to wait for the signature response (env: TRACE_DEADLINE_SECS)
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Pixels to scroll after navigation (env: TRACE_SCROLL_OFFSET)
    #[arg(long, global = true)]
    scroll_offset: Option<i64>,

    /// URL substring, or `re:<regex>`, of the call to capture (env: TRACE_SIGNATURE)
    #[arg(long, global = true)]
    signature: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut RuntimeConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(path) = self.chromium {
            config.chromium_path = Some(path);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(secs) = self.deadline_secs {
            config.race.deadline = Duration::from_secs(secs);
        }
        if let Some(offset) = self.scroll_offset {
            config.race.scroll_offset = offset;
        }
        if let Some(signature) = self.signature {
            config.signature = signature;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve GET /trace?url=... over HTTP (default)
    Serve,
    /// Capture a single page and print the JSON result
    Capture {
        /// Page to load
        url: String,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Also launch Chromium once to verify it starts
        #[arg(long)]
        launch: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RuntimeConfig::from_env();
    cli.overrides.apply(&mut config);
    config.log_json |= cli.log_json;

    if !matches!(cli.command, Some(Commands::Completions { .. })) {
        cli::init_tracing(config.log_json, cli.verbose);
    }

    let result = match cli.command {
        None | Some(Commands::Serve) => cli::serve::run(config).await,
        Some(Commands::Capture { url }) => cli::capture_cmd::run(&config, &url).await,
        Some(Commands::Doctor { launch }) => cli::doctor::run(&config, launch).await,
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "trace", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}

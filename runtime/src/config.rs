// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration.
//!
//! Values come from the environment first; command-line flags override them.
//! An unparsable environment value falls back to the default with a warning.

use crate::capture::lifecycle::LifecycleMode;
use crate::capture::race::RaceSettings;
use crate::capture::DEFAULT_SIGNATURE;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;

/// Everything needed to start serving captures.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Explicit Chromium binary; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    pub mode: LifecycleMode,
    pub launch_timeout: Duration,
    pub race: RaceSettings,
    /// Signature, see [`crate::capture::Signature::parse`].
    pub signature: String,
    /// Tracker hosts added to the built-in list.
    pub extra_block_hosts: Vec<String>,
    pub log_json: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            chromium_path: None,
            mode: LifecycleMode::default(),
            launch_timeout: Duration::from_secs(20),
            race: RaceSettings::default(),
            signature: DEFAULT_SIGNATURE.to_string(),
            extra_block_hosts: Vec::new(),
            log_json: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parsed(&lookup, "PORT") {
            config.port = port;
        }
        if let Some(host) = parsed(&lookup, "TRACE_HOST") {
            config.host = host;
        }
        if let Some(path) = lookup("TRACE_CHROMIUM_PATH").filter(|p| !p.trim().is_empty()) {
            config.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(mode) = parsed(&lookup, "TRACE_ENGINE_MODE") {
            config.mode = mode;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "TRACE_LAUNCH_TIMEOUT_SECS") {
            config.launch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "TRACE_DEADLINE_SECS") {
            config.race.deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "TRACE_NAVIGATION_TIMEOUT_SECS") {
            config.race.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(offset) = parsed(&lookup, "TRACE_SCROLL_OFFSET") {
            config.race.scroll_offset = offset;
        }
        if let Some(ms) = parsed::<u64, _>(&lookup, "TRACE_SCROLL_DELAY_MS") {
            config.race.scroll_delay = Duration::from_millis(ms);
        }
        if let Some(signature) = lookup("TRACE_SIGNATURE").filter(|s| !s.is_empty()) {
            config.signature = signature;
        }
        if let Some(hosts) = lookup("TRACE_BLOCK_HOSTS") {
            config.extra_block_hosts = split_list(&hosts);
        }
        if let Some(format) = lookup("TRACE_LOG_FORMAT") {
            config.log_json = format.trim().eq_ignore_ascii_case("json");
        }

        config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

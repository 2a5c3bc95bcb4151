//! CLI subcommand implementations for the `trace` binary.

pub mod capture_cmd;
pub mod doctor;
pub mod serve;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Logs go to stderr so `capture`
/// output on stdout stays machine-readable.
pub fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "trace_runtime=debug" } else { "trace_runtime=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

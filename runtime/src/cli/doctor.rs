//! Environment readiness check.

use crate::config::RuntimeConfig;
use crate::renderer::chromium::{find_chromium, ChromiumEngine};
use crate::renderer::Engine;
use anyhow::Result;

/// Minimum memory for one headless Chromium with a loaded page.
const MIN_MEMORY_MB: u64 = 256;

/// Check Chromium availability and memory; optionally try a real launch.
pub async fn run(config: &RuntimeConfig, launch: bool) -> Result<()> {
    println!("Trace Doctor");
    println!("============");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium_path = find_chromium(config.chromium_path.as_deref());
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Set TRACE_CHROMIUM_PATH to a Chrome/Chromium binary."),
    }

    match available_memory_mb() {
        Some(mb) if mb >= MIN_MEMORY_MB => {
            println!("[OK] Available memory: {mb}MB (>= {MIN_MEMORY_MB}MB required)")
        }
        Some(mb) => println!("[!!] Available memory: {mb}MB (< {MIN_MEMORY_MB}MB, may be insufficient)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    println!("Engine mode: {}", config.mode);
    println!("Deadline:    {:?}", config.race.deadline);
    println!("Signature:   {}", config.signature);
    println!("Listen:      {}", config.listen_addr());

    let mut ready = chromium_path.is_some();
    if ready && launch {
        println!();
        match ChromiumEngine::launch(config.chromium_path.as_deref(), config.launch_timeout).await {
            Ok(engine) => {
                println!("[OK] Chromium launched and responded");
                engine.shutdown().await?;
            }
            Err(e) => {
                println!("[!!] Chromium failed to launch: {e:#}");
                ready = false;
            }
        }
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Available memory in MB, from /proc/meminfo.
fn available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem_available() {
        let meminfo = "MemTotal:       16303156 kB\nMemFree:         1021400 kB\nMemAvailable:    8388608 kB\n";
        assert_eq!(parse_mem_available(meminfo), Some(8192));
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }
}

//! Environment readiness check.

use crate::config::Config;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability and print the effective configuration.
pub fn run(config: &Config) -> Result<()> {
    println!("Forager Doctor");
    println!("==============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium = find_chromium(config.chromium_path.as_deref());
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Browser layers will be skipped; set FORAGER_CHROMIUM_PATH or install Chrome."
        ),
    }

    println!();
    println!("Mode:               {}", config.mode.as_str());
    println!("Pool size:          {}", config.pool_size);
    println!("Max concurrent:     {}", config.max_concurrent);
    println!(
        "Layer timeouts:     browser_pool={}ms advanced={}ms basic_http={}ms",
        config.browser_timeout.as_millis(),
        config.advanced_timeout.as_millis(),
        config.http_timeout.as_millis()
    );
    println!(
        "Adaptive envelope:  [{}ms, {}ms]",
        config.timeout_floor.as_millis(),
        config.timeout_ceiling.as_millis()
    );
    println!();

    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: DEGRADED (HTTP-only)");
    }

    Ok(())
}

//! `rebound config` – show where the config lives and what it resolves to.

use anyhow::Result;
use rebound_core::config::{self, ReboundConfig};
use rebound_core::RetryPolicy;

pub fn run_config(cfg: &ReboundConfig, path_only: bool) -> Result<()> {
    let path = config::config_path()?;
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }
    println!("config: {}", path.display());
    println!("{}", serde_json::to_string_pretty(cfg)?);

    let policy = RetryPolicy::from_config(&cfg.retry);
    match policy.budget().bound() {
        Some(n) => println!("attempts: up to {}", u64::from(n) + 1),
        None => println!("attempts: unbounded"),
    }
    let waits: Vec<String> = (0..3)
        .filter_map(|attempt| policy.delay_for(attempt))
        .map(|d| format!("{:?}", d))
        .collect();
    if !waits.is_empty() {
        println!("first waits: {}", waits.join(", "));
    }
    Ok(())
}

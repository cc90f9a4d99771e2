//! Reservation planning command.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use console::style;
use domain_throttle::throttle::normalize_key;
use domain_throttle::{DomainThrottle, ManualClock, ThrottleConfig};

use crate::cli::helpers::{read_targets, target_key};
use crate::cli::icons::{dim_arrow, warn};

/// Reserve every target at one frozen instant and print the resulting waits.
pub fn cmd_plan(config: &ThrottleConfig, file: Option<&Path>) -> anyhow::Result<()> {
    let targets = read_targets(file)?;
    let throttle = DomainThrottle::with_clock(config, Arc::new(ManualClock::new()))?;

    let mut last_wait: BTreeMap<String, u128> = BTreeMap::new();
    for target in &targets {
        let reserved =
            normalize_key(&target_key(target)).and_then(|key| Ok((throttle.reserve(&key)?, key)));
        match reserved {
            Ok((wait, key)) => {
                let ms = wait.as_millis();
                println!("{:>10}ms  {}  {}", ms, style(&key).cyan(), style(target).dim());
                last_wait.insert(key, ms);
            }
            Err(e) => eprintln!("{} {}: {}", warn(), target, e),
        }
    }

    println!();
    println!(
        "{} request(s) across {} domain(s), backoff {}ms",
        targets.len(),
        throttle.tracked_keys(),
        config.backoff_interval_ms
    );
    if let Some((domain, ms)) = last_wait.iter().max_by_key(|(_, ms)| **ms) {
        println!("  {} Longest queue: {} ({}ms)", dim_arrow(), domain, ms);
    }
    Ok(())
}

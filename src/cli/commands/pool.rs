//! Worker pool simulation command.

use std::path::Path;
use std::time::{Duration, Instant};

use console::style;
use domain_throttle::{DomainThrottle, ThrottleConfig, ThrottleError};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::cli::helpers::{read_targets, target_key};
use crate::cli::icons::{dim_arrow, success};

/// Attempts per request when the throttle reports contention.
const MAX_ATTEMPTS: u32 = 3;

/// Drive targets through `workers` concurrent workers, each waiting on the
/// throttle before "dispatching" its request.
pub async fn cmd_run(
    config: &ThrottleConfig,
    file: Option<&Path>,
    workers: usize,
) -> anyhow::Result<()> {
    let targets = read_targets(file)?;
    let total = targets.len();
    let throttle = DomainThrottle::start(config)?;
    let started = Instant::now();

    let throttle_ref = &throttle;
    stream::iter(targets)
        .for_each_concurrent(workers.max(1), move |target| async move {
            let key = target_key(&target);
            match wait_with_retry(throttle_ref, &key).await {
                Ok(waited) => {
                    info!("Dispatching {} after {:?}", target, waited);
                    println!(
                        "{:>8.2}s  {}  {}",
                        started.elapsed().as_secs_f64(),
                        style(&key).cyan(),
                        style(&target).dim()
                    );
                }
                Err(e) => warn!("Skipping {}: {}", target, e),
            }
        })
        .await;

    let mut stats: Vec<_> = throttle.stats().into_iter().collect();
    stats.sort_by(|a, b| a.0.cmp(&b.0));

    println!();
    println!(
        "{} Released {} request(s) in {:.2}s",
        success(),
        total,
        started.elapsed().as_secs_f64()
    );
    for (domain, stat) in stats {
        println!(
            "  {} {}: {} request(s)",
            dim_arrow(),
            domain,
            stat.total_reservations
        );
    }

    throttle.shutdown().await;
    Ok(())
}

async fn wait_with_retry(throttle: &DomainThrottle, key: &str) -> Result<Duration, ThrottleError> {
    let mut attempt = 1;
    loop {
        match throttle.wait_for(key).await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!("{} (attempt {}/{})", e, attempt, MAX_ATTEMPTS);
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

//! Shared helper functions for CLI commands.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use domain_throttle::throttle::extract_domain;

/// Read request targets (URLs or bare hostnames), one per line.
/// Reads stdin when no file is given. Blank lines and `#` comments are skipped.
pub fn read_targets(file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let contents = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read targets from {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read targets from stdin")?;
            buf
        }
    };
    Ok(parse_targets(&contents))
}

pub fn parse_targets(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Throttle key for a target: the URL's host, or the target itself.
pub fn target_key(target: &str) -> String {
    extract_domain(target).unwrap_or_else(|| target.to_string())
}

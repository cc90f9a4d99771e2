//! Configuration display command.

use console::style;
use domain_throttle::ThrottleConfig;

/// Print the effective configuration as TOML.
pub fn cmd_config_show(config: &ThrottleConfig) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());

    println!("{}", style(format!("# source: {}", source)).dim());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

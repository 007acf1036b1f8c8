//! Display utilities for the cronsync CLI

use anyhow::{Context, Result};
use console::style;
use cronsync_config::Config;
use cronsync_engine::{ControlPlane, FlagSnapshot};
use cronsync_types::ControlFlag;

/// Display the presence of every control flag
pub fn display_flag_status(control: &ControlPlane, snapshot: &FlagSnapshot) {
    println!("{}", style("Control flags:").bold().underlined());
    for flag in ControlFlag::ALL {
        let present = snapshot.get(flag);
        println!(
            "  {:<8} {}  {}",
            flag.to_string(),
            flag_marker(flag, present),
            style(control.locate(flag)).dim()
        );
    }

    println!();
    println!("  {}", summary(snapshot));
}

/// Display the result of a pause, resume or clear command
pub fn display_flag_change(control: &ControlPlane, flag: ControlFlag, present: bool) {
    let verb = if present { "Created" } else { "Removed" };
    println!(
        "{} {} {} flag ({})",
        style("✓").green(),
        verb,
        style(flag).bold(),
        style(control.locate(flag)).cyan()
    );
}

/// Print configuration as YAML
pub fn display_config(config: &Config, default: bool) -> Result<()> {
    let title = if default {
        "Default configuration:"
    } else {
        "Current configuration:"
    };
    println!("{} {}", style("⚙").blue().bold(), style(title).bold());
    let rendered = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

fn flag_marker(flag: ControlFlag, present: bool) -> console::StyledObject<&'static str> {
    match (flag, present) {
        (_, false) => style("absent").dim(),
        (ControlFlag::Running, true) => style("present").yellow().bold(),
        (ControlFlag::Stopped, true) => style("present").cyan().bold(),
        (ControlFlag::Failed, true) => style("present").red().bold(),
    }
}

fn summary(snapshot: &FlagSnapshot) -> String {
    let mut parts = Vec::new();
    if snapshot.stopped {
        parts.push("paused, runs exit without copying");
    }
    if snapshot.running {
        parts.push("a run is in progress");
    }
    if snapshot.failed {
        parts.push("the last run failed");
    }
    if parts.is_empty() {
        "idle, last run succeeded".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        assert_eq!(summary(&FlagSnapshot::default()), "idle, last run succeeded");

        let snapshot = FlagSnapshot {
            running: true,
            stopped: false,
            failed: true,
        };
        assert_eq!(summary(&snapshot), "a run is in progress; the last run failed");
    }
}

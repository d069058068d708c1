//! Rendering of command results
//!
//! Every command prints through [`Output`], which picks human text, JSON
//! (`--json`) or bare values for scripts (`--quiet`).

use anyhow::{Context, Result};
use serde::Serialize;

use tracker_core::sync::SyncReport;
use tracker_core::{ConfidenceLevel, ConfidenceMap, ConfidenceStats, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    /// Bare values, one per line
    Quiet,
}

impl OutputFormat {
    /// `--quiet` wins over `--json`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
        println!("{}", text);
        Ok(())
    }

    /// Print the confidence map
    pub fn print_map(&self, map: &ConfidenceMap) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if map.is_empty() {
                    println!("No confidence levels recorded.");
                    return Ok(());
                }
                let width = map.keys().map(|k| k.chars().count()).max().unwrap_or(0).min(60);
                for (key, level) in map {
                    println!("{:<width$}  {}", truncate(key, 60), describe_level(level));
                }
                println!("\n{} problem(s)", map.len());
            }
            OutputFormat::Json => self.json(map)?,
            OutputFormat::Quiet => {
                for (key, level) in map {
                    println!("{}\t{}", key, level);
                }
            }
        }
        Ok(())
    }

    /// Print level counts and progress
    pub fn print_stats(&self, stats: &ConfidenceStats, source: &str) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("Confidence ({})", source);
                println!();
                for level in ConfidenceLevel::ALL {
                    println!("  {:<14} {}", level.label(), stats.count(level));
                }
                if stats.uncounted() > 0 {
                    println!("  {:<14} {}", "Other", stats.uncounted());
                }
                println!();
                println!("  Total:    {}", stats.total);
                println!(
                    "  Progress: {}% ({} of {} at medium or above)",
                    stats.progress_percent(),
                    stats.confident(),
                    stats.total
                );
            }
            OutputFormat::Json => self.json(&serde_json::json!({
                "source": source,
                "stats": stats,
                "confident": stats.confident(),
                "progressPercent": stats.progress_percent(),
            }))?,
            OutputFormat::Quiet => println!("{}", stats.progress_percent()),
        }
        Ok(())
    }

    /// Print a finished sync
    pub fn print_report(&self, report: &SyncReport) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                self.success(&format!("Sync complete - {} entries", report.entries));
                println!(
                    "  Pulled: {}, Pushed: {}, Kept local: {}",
                    report.pulled, report.pushed, report.overridden
                );
            }
            OutputFormat::Json => self.json(report)?,
            OutputFormat::Quiet => {}
        }
        Ok(())
    }

    /// Print the logged-in account
    pub fn print_user(&self, user: &User, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Human => self.success(&format!("{} as {}", message, user.username)),
            OutputFormat::Json => self.json(user)?,
            OutputFormat::Quiet => println!("{}", user.username),
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        self.notice("✓ ", "success", message);
    }

    /// Plain informational line
    pub fn message(&self, message: &str) {
        self.notice("", "info", message);
    }

    /// Goes to stderr so it never mixes with JSON on stdout
    pub fn warn(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Interactive confirmation only makes sense for human output
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    fn notice(&self, marker: &str, status: &str, message: &str) {
        match self.format {
            OutputFormat::Human => println!("{}{}", marker, message),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "status": status, "message": message }))
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Label for a stored level; unknown values are shown raw
pub fn describe_level(level: &str) -> String {
    match ConfidenceLevel::parse(level) {
        Some(known) => known.label().to_string(),
        None => format!("{} (unknown)", level),
    }
}

/// Cut to `max_chars` characters, ending in "..." when shortened
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        let cases = [
            (false, false, OutputFormat::Human),
            (true, false, OutputFormat::Json),
            (false, true, OutputFormat::Quiet),
            (true, true, OutputFormat::Quiet),
        ];
        for (json, quiet, expected) in cases {
            assert_eq!(OutputFormat::from_flags(json, quiet), expected);
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_describe_level() {
        assert_eq!(describe_level("none"), "Not Attempted");
        assert_eq!(describe_level("expert"), "Expert");
        assert_eq!(describe_level("legendary"), "legendary (unknown)");
    }
}

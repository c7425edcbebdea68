//! Output formatting for the `scan` command

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::discovery::{NameCollision, Reduction, SkippedDefinition};
use crate::model::ServiceDefinition;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

/// Serializable view of one discovery pass
#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    pub root: &'a Path,
    pub services: Vec<&'a ServiceDefinition>,
    pub collisions: &'a [NameCollision],
    pub skipped: &'a [SkippedDefinition],
    pub unreadable_dirs: &'a [PathBuf],
}

impl<'a> ScanReport<'a> {
    pub fn new(root: &'a Path, reduction: &'a Reduction, unreadable_dirs: &'a [PathBuf]) -> Self {
        Self {
            root,
            services: reduction.services.values().collect(),
            collisions: &reduction.collisions,
            skipped: &reduction.skipped,
            unreadable_dirs,
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_scan(&self, report: &ScanReport<'_>) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize scan report to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize scan report to YAML")
            }
            OutputFormat::Human => Ok(self.format_scan_human(report)),
        }
    }

    fn format_scan_human(&self, report: &ScanReport<'_>) -> String {
        let mut output = String::new();

        output.push_str(&format!("\u{2713} Discovered Services ({})\n", report.services.len()));
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Root: {}\n\n", report.root.display()));

        if report.services.is_empty() {
            output.push_str("(no services found)\n");
        }

        for service in &report.services {
            output.push_str(&format!("{} [{}]\n", service.name, service.kind));
            output.push_str(&format!(
                "\u{251C}\u{2500} Source: {}\n",
                service.source_path.display()
            ));
            if let Some(image) = &service.image {
                output.push_str(&format!("\u{251C}\u{2500} Image:  {}\n", image));
            }
            if !service.environment.is_empty() {
                let keys: Vec<&str> = service.environment.keys().map(String::as_str).collect();
                output.push_str(&format!("\u{251C}\u{2500} Env:    {}\n", keys.join(", ")));
            }
            let ports = service.port_strings();
            if ports.is_empty() {
                output.push_str("\u{2514}\u{2500} Ports:  (none)\n\n");
            } else {
                output.push_str(&format!("\u{2514}\u{2500} Ports:  {}\n\n", ports.join(", ")));
            }
        }

        let skipped = report.skipped.len() + report.unreadable_dirs.len();
        if !report.collisions.is_empty() || skipped > 0 {
            output.push_str("\u{26A0} Warnings:\n");
            for collision in report.collisions {
                output.push_str(&format!(
                    "  - {}: {} replaced {}\n",
                    collision.name,
                    collision.replacement.display(),
                    collision.previous.display()
                ));
            }
            for entry in report.skipped {
                output.push_str(&format!("  - skipped {}: {}\n", entry.path.display(), entry.reason));
            }
            for dir in report.unreadable_dirs {
                output.push_str(&format!("  - unreadable directory {}\n", dir.display()));
            }
        }

        output
    }
}

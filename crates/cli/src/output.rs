// Output formatting for CLI

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::command::ItemReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn render_value<T: Serialize>(&self, value: &T) -> Result<Option<String>> {
        match self {
            OutputFormat::Json => Ok(Some(serde_json::to_string_pretty(value)?)),
            OutputFormat::Yaml => Ok(Some(serde_yaml::to_string(value)?)),
            OutputFormat::Text => Ok(None),
        }
    }
}

/// Write every item's result, in submission order
pub fn write_reports(
    out: &mut impl Write,
    format: OutputFormat,
    reports: &[ItemReport],
) -> Result<()> {
    if let Some(rendered) = format.render_value(&reports)? {
        writeln!(out, "{}", rendered.trim_end())?;
        return Ok(());
    }

    for report in reports {
        out.write_all(report.stdout.as_bytes())?;
        if !report.stdout.is_empty() && !report.stdout.ends_with('\n') {
            writeln!(out)?;
        }
    }
    Ok(())
}

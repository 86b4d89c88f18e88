//! Diff report rendering

use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::Utc;
use tracing::info;

use crate::errors::UpgradeError;
use crate::models::artifact::ArtifactRef;
use crate::snapshot::diff::{Change, DiffReport, NextHop};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::ReportFormat;
use crate::utils::file_timestamp;

/// Turns a diff report into a document
pub trait ReportRenderer: Send + Sync {
    fn extension(&self) -> &'static str;

    fn render(&self, report: &DiffReport) -> Result<String, UpgradeError>;
}

pub fn renderer_for(format: ReportFormat) -> Box<dyn ReportRenderer> {
    match format {
        ReportFormat::Text => Box::new(TextReportRenderer),
        ReportFormat::Json => Box::new(JsonReportRenderer),
    }
}

/// Human readable plain-text report
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportRenderer;

impl ReportRenderer for TextReportRenderer {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, report: &DiffReport) -> Result<String, UpgradeError> {
        let mut out = String::new();
        let fmt_err = |e: std::fmt::Error| UpgradeError::Internal(e.to_string());

        writeln!(out, "Snapshot comparison for {}", report.device).map_err(fmt_err)?;
        writeln!(out, "  pre:  {}", report.pre_taken_at.to_rfc3339()).map_err(fmt_err)?;
        writeln!(out, "  post: {}", report.post_taken_at.to_rfc3339()).map_err(fmt_err)?;
        writeln!(out).map_err(fmt_err)?;

        if report.is_empty() {
            writeln!(out, "No differences found.").map_err(fmt_err)?;
            return Ok(out);
        }

        writeln!(out, "Routes ({} change(s))", report.routes.len()).map_err(fmt_err)?;
        let hops = |set: &BTreeSet<NextHop>| {
            set.iter()
                .map(|h| format!("{} via {}", h.gateway, h.interface))
                .collect::<Vec<_>>()
                .join(", ")
        };
        for change in &report.routes {
            let line = match change {
                Change::Added { key, after } => format!("  + {} -> {}", key, hops(after)),
                Change::Removed { key, before } => format!("  - {} -> {}", key, hops(before)),
                Change::Changed { key, before, after } => {
                    format!("  ~ {}: {} => {}", key, hops(before), hops(after))
                }
            };
            writeln!(out, "{}", line).map_err(fmt_err)?;
        }

        writeln!(out, "Interfaces ({} change(s))", report.interfaces.len()).map_err(fmt_err)?;
        for change in &report.interfaces {
            let line = match change {
                Change::Added { key, after } => format!("  + {} ({})", key, after.status),
                Change::Removed { key, before } => format!("  - {} ({})", key, before.status),
                Change::Changed { key, before, after } => {
                    format!("  ~ {}: {} => {}", key, before.status, after.status)
                }
            };
            writeln!(out, "{}", line).map_err(fmt_err)?;
        }

        let s = &report.sessions;
        writeln!(out, "Sessions").map_err(fmt_err)?;
        writeln!(out, "  total: {} => {} ({:+})", s.before.total, s.after.total, s.total).map_err(fmt_err)?;
        writeln!(out, "  tcp:   {} => {} ({:+})", s.before.tcp, s.after.tcp, s.tcp).map_err(fmt_err)?;
        writeln!(out, "  udp:   {} => {} ({:+})", s.before.udp, s.after.udp, s.udp).map_err(fmt_err)?;

        Ok(out)
    }
}

/// The report serialized as pretty JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, report: &DiffReport) -> Result<String, UpgradeError> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

/// Render `report` and write it under the device's diff directory
pub async fn render_report(
    layout: &StorageLayout,
    report: &DiffReport,
    renderer: &dyn ReportRenderer,
) -> Result<ArtifactRef, UpgradeError> {
    let document = renderer.render(report)?;
    let stem = format!("{}_report", file_timestamp(Utc::now()));
    let artifact = layout
        .diff_dir(&report.device)
        .create_unique_file(&stem, renderer.extension(), document.as_bytes())
        .await?;
    info!("{}: Diff report written to {}", report.device, artifact.path.display());
    Ok(artifact)
}

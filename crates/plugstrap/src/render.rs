//! Plain-text rendering of reports.
//!
//! Every function returns a `String`; printing is left to the commands.

use plugstrap_core::outcome::Summary;
use plugstrap_core::{InstalledTool, Plan, RunReport, VersionReport};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Left-aligned columns separated by two spaces.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &mut dyn Iterator<Item = &str>| {
        let mut out = String::new();
        for (i, (cell, &width)) in cells.zip(&widths).enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            let _ = write!(out, "{cell:<width$}");
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    };

    let mut out = line(&mut headers.iter().copied());
    for row in rows {
        out.push_str(&line(&mut row.iter().map(String::as_str)));
    }
    out
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn seconds(ms: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let secs = ms as f64 / 1000.0;
    format!("{secs:.1}s")
}

/// `2 installed, 1 upgraded, 4 skipped, 1 failed`
#[must_use]
pub fn summary_line(summary: Summary) -> String {
    format!(
        "{} installed, {} upgraded, {} skipped, {} failed",
        summary.installed, summary.upgraded, summary.skipped, summary.failed
    )
}

/// Outcome table, summary line and warnings of a sync run.
#[must_use]
pub fn run_report(report: &RunReport) -> String {
    let rows: Vec<Vec<String>> = report
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.phase.clone(),
                o.name.clone(),
                o.action.to_string(),
                or_dash(o.installed_version.as_deref()),
                or_dash(o.latest_version.as_deref()),
                seconds(o.duration_ms),
            ]
        })
        .collect();

    let mut out = table(
        &["PHASE", "PLUGIN", "ACTION", "INSTALLED", "LATEST", "TIME"],
        &rows,
    );
    out.push('\n');
    out.push_str(&summary_line(report.summary()));
    out.push('\n');

    let warnings: Vec<_> = report.warnings().collect();
    if !warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for outcome in warnings {
            let _ = writeln!(
                out,
                "  {}: {}{}",
                outcome.name,
                outcome.action,
                outcome
                    .error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
        }
    }
    out
}

/// Installed versus latest, one row per plugin.
#[must_use]
pub fn version_reports(reports: &[VersionReport]) -> String {
    let rows: Vec<Vec<String>> = reports
        .iter()
        .map(|r| {
            let status = match (&r.installed, &r.error) {
                _ if r.up_to_date => "up to date".to_string(),
                (_, Some(error)) => format!("unknown ({error})"),
                (None, None) => "not installed".to_string(),
                (Some(_), None) => "outdated".to_string(),
            };
            vec![
                r.phase.clone(),
                r.name.clone(),
                or_dash(r.installed.as_deref()),
                or_dash(r.latest.as_deref()),
                status,
            ]
        })
        .collect();
    table(&["PHASE", "PLUGIN", "INSTALLED", "LATEST", "STATUS"], &rows)
}

/// Phases and plugins with their resolved strategies.
#[must_use]
pub fn plan_listing(plan: &Plan) -> String {
    let mut out = String::new();
    for (index, phase) in plan.phases.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}. {}", index + 1, phase.name);

        let rows: Vec<Vec<String>> = phase
            .plugins
            .iter()
            .map(|p| {
                let mut flags = Vec::new();
                if p.spec.mandatory {
                    flags.push("mandatory");
                }
                if !p.spec.enabled {
                    flags.push("disabled");
                }
                if p.spec.register_to_path {
                    flags.push("path");
                }
                vec![
                    format!("  {}", p.name()),
                    p.spec.source.to_string(),
                    format!("probe={}", p.probe.kind()),
                    format!("install={}", p.install.kind()),
                    if p.requires.is_empty() {
                        String::new()
                    } else {
                        format!("requires={}", p.requires.join(","))
                    },
                    flags.join(","),
                ]
            })
            .collect();

        // Headerless: drop the header line `table` produces
        let body = table(&["", "", "", "", "", ""], &rows);
        out.push_str(body.split_once('\n').map_or("", |(_, rest)| rest));
    }
    out
}

/// `name  directory` lines.
#[must_use]
pub fn install_roots(roots: &BTreeMap<String, PathBuf>) -> String {
    if roots.is_empty() {
        return "No plugins installed.\n".to_string();
    }
    let rows: Vec<Vec<String>> = roots
        .iter()
        .map(|(name, dir)| vec![name.clone(), dir.display().to_string()])
        .collect();
    table(&["PLUGIN", "DIRECTORY"], &rows)
}

/// Plugin name → install directory.
#[must_use]
pub fn roots_of(installed: &BTreeMap<String, InstalledTool>) -> BTreeMap<String, PathBuf> {
    installed
        .iter()
        .map(|(name, tool)| (name.clone(), tool.directory.clone()))
        .collect()
}

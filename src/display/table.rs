//! Table rendering for bus reports
//!
//! Tables use the prettytable clean format with a 2-space indent. Cells are
//! plain text; colour is applied to headings around the table only, since
//! escape codes would throw off column widths.

use std::collections::BTreeMap;
use prettytable::{format, Cell, Row, Table};
use crate::modules::{ModuleHealth, ModuleInfo};
use crate::monitor::MetricsSnapshot;

/// Format a compact table with headers and rows
pub fn format_compact_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(Row::new(headers.iter().map(|header| Cell::new(header)).collect()));
    for row in rows {
        table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
    }

    let mut result = String::new();
    for line in table.to_string().lines() {
        result.push_str("  ");
        result.push_str(line);
        result.push('\n');
    }
    result
}

pub fn modules_table(modules: &[ModuleInfo]) -> String {
    let rows: Vec<Vec<String>> = modules
        .iter()
        .map(|info| {
            vec![
                info.id.clone(),
                info.version.clone(),
                info.state.to_string(),
                join_or_dash(&info.dependencies),
                info.subscriptions.to_string(),
                info.last_error.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    format_compact_table(&["Module", "Version", "State", "Depends on", "Subs", "Last error"], &rows)
}

pub fn health_table(health: &BTreeMap<String, ModuleHealth>) -> String {
    let rows: Vec<Vec<String>> = health
        .iter()
        .map(|(id, health)| {
            let unmet: Vec<String> = health
                .dependencies
                .iter()
                .filter(|(_, active)| !**active)
                .map(|(dependency, _)| dependency.clone())
                .collect();
            vec![
                id.clone(),
                health.status.to_string(),
                health.metrics.events_processed.to_string(),
                health.metrics.events_emitted.to_string(),
                health.metrics.handler_errors.to_string(),
                format!("{:.2}", health.metrics.avg_processing_time_ms),
                join_or_dash(&unmet),
                health.message.clone().unwrap_or_default(),
            ]
        })
        .collect();
    format_compact_table(
        &["Module", "Status", "Processed", "Emitted", "Errors", "Avg ms", "Unmet deps", "Message"],
        &rows,
    )
}

pub fn metrics_table(metrics: &MetricsSnapshot) -> String {
    let rows = vec![
        vec!["Events dispatched".to_string(), metrics.total_events.to_string()],
        vec!["Unmatched events".to_string(), metrics.unmatched_events.to_string()],
        vec!["Handler invocations".to_string(), metrics.handler_invocations.to_string()],
        vec!["Handler errors".to_string(), metrics.handler_errors.to_string()],
        vec!["Filtered out".to_string(), metrics.filtered_out.to_string()],
        vec!["Failed dispatches".to_string(), metrics.failed_dispatches.to_string()],
        vec!["Error rate".to_string(), format!("{:.1}%", metrics.error_rate)],
        vec!["Avg latency".to_string(), format!("{:.3} ms", metrics.avg_latency_ms)],
    ];
    format_compact_table(&["Metric", "Value"], &rows)
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

//! Table rendering for reclaim reports

use lattice_reclaim::{FinalState, ReclaimReport, ResourceReport};

const HEADERS: &[&str] = &["RESOURCE", "STATE", "ROUND", "ATTEMPTS", "DETAIL"];

pub fn print_report_table(report: &ReclaimReport) {
    if report.resources.is_empty() {
        println!("No resources found for cluster {}.", report.cluster);
    } else {
        print_table(HEADERS, &report_rows(report));
    }

    println!();
    for line in summary_lines(report) {
        println!("{}", line);
    }
}

fn report_rows(report: &ReclaimReport) -> Vec<Vec<String>> {
    report
        .resources
        .iter()
        .map(|r| {
            vec![
                r.key.clone(),
                state_label(r),
                r.round.map_or_else(|| "-".to_string(), |n| n.to_string()),
                r.attempts.to_string(),
                detail(r),
            ]
        })
        .collect()
}

fn state_label(r: &ResourceReport) -> String {
    match (r.state, r.pending_reason) {
        (FinalState::Pending, Some(reason)) => reason.to_string(),
        (state, _) => state.to_string(),
    }
}

fn detail(r: &ResourceReport) -> String {
    if let Some(error) = &r.error {
        return error.clone();
    }
    if !r.blockers.is_empty() {
        return format!("blocked by {}", r.blockers.join(", "));
    }
    String::new()
}

fn summary_lines(report: &ReclaimReport) -> Vec<String> {
    let mut lines = vec![
        format!("Run:     {}", report.run_id),
        format!("Status:  {}", report.status()),
        format!("Rounds:  {} ({})", report.rounds, report.stop_reason),
    ];
    for failure in &report.listing_failures {
        lines.push(format!("Listing failed: {}", failure));
    }
    if !report.duplicate_keys.is_empty() {
        lines.push(format!(
            "Duplicate keys: {}",
            report.duplicate_keys.join(", ")
        ));
    }
    lines
}

/// Print rows as a column-aligned table with headers
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
}

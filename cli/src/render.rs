//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use servicedesk_core::query::Board;
use servicedesk_core::{BoardStats, Case, PhotoBatchReport, Priority, codec::estimate_size_kb};

const SHORT_ID_LEN: usize = 8;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

pub fn board(board: &Board<'_>) -> String {
    let mut out = String::new();
    for column in &board.columns {
        let _ = writeln!(out, "== {} ({}) ==", column.stage.label(), column.cases.len());
        for case in &column.cases {
            let marker = if case.priority == Priority::Urgent { "!" } else { " " };
            let _ = writeln!(
                out,
                "{marker} {}  {:<12} {:<20} {:<16} {}",
                short_id(&case.id),
                case.registration_number,
                case.customer_name,
                case.vehicle_model,
                case.updated_at.format(TIME_FORMAT),
            );
        }
    }
    out
}

pub fn case_detail(case: &Case) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}", case.id, case.registration_number);
    let _ = writeln!(out, "Customer:   {} ({})", case.customer_name, case.customer_phone);
    let _ = writeln!(out, "Vehicle:    {} {}", case.vehicle_color, case.vehicle_model);
    let _ = writeln!(out, "Damage:     {}", case.damage_description);
    let _ = writeln!(out, "Stage:      {}", case.stage.label());
    let _ = writeln!(out, "Insurance:  {}", case.insurance_status.label());
    let _ = writeln!(out, "Parts:      {}", case.parts_status.label());
    let _ = writeln!(out, "Priority:   {}", case.priority.label());
    let _ = writeln!(out, "Created:    {}", case.created_at.format(TIME_FORMAT));
    let _ = writeln!(out, "Updated:    {}", case.updated_at.format(TIME_FORMAT));

    if !case.notes.is_empty() {
        let _ = writeln!(out, "Notes:");
        for note in &case.notes {
            let _ = writeln!(out, "  [{}] {}", note.timestamp.format(TIME_FORMAT), note.text);
        }
    }
    if !case.photos.is_empty() {
        let _ = writeln!(out, "Photos:");
        for photo in &case.photos {
            let _ = writeln!(
                out,
                "  {}  ~{} KB{}",
                short_id(&photo.id),
                estimate_size_kb(&photo.data_url),
                if photo.archived { "  (archived)" } else { "" },
            );
        }
    }
    out
}

pub fn stats(stats: &BoardStats) -> String {
    format!(
        "total {}  active {}  urgent {}  in workshop {}  ready {}  closed {}\n",
        stats.total,
        stats.active,
        stats.urgent,
        stats.in_workshop,
        stats.ready_for_delivery,
        stats.closed,
    )
}

pub fn photo_report(report: &PhotoBatchReport) -> String {
    let mut line = format!("{} photo(s) added", report.added);
    if report.failed > 0 {
        let _ = write!(line, ", {} could not be processed", report.failed);
    }
    if report.skipped > 0 {
        let _ = write!(line, ", {} skipped (photo limit reached)", report.skipped);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn photo_report_mentions_only_nonzero_counts() {
        let report = PhotoBatchReport {
            added: 2,
            failed: 0,
            skipped: 1,
        };
        assert_eq!(
            photo_report(&report),
            "2 photo(s) added, 1 skipped (photo limit reached)"
        );
    }
}

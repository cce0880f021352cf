//! CLI presentation: restore summary formatter.

use crate::restore::RestoreReport;
use comfy_table::Table;

/// Render a finished run as a table, followed by the oplog line when replay ran
pub fn format_report(report: &RestoreReport) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Metric", "Count"]);

    let rows: [(&str, u64); 7] = [
        ("Files restored", report.files_restored),
        ("Documents inserted", report.documents_inserted),
        ("Documents updated", report.documents_updated),
        ("Documents filtered", report.documents_filtered),
        ("Users removed", report.users_removed),
        ("Collections created", report.collections_created),
        ("Indexes built", report.indexes_built),
    ];
    for (label, count) in rows {
        table.add_row(vec![label.to_string(), count.to_string()]);
    }

    let mut out = table.to_string();
    if let Some(finished) = report.finished_at {
        let elapsed = finished - report.started_at;
        out.push_str(&format!(
            "\nFinished in {}.{:03}s",
            elapsed.num_seconds(),
            elapsed.num_milliseconds().rem_euclid(1000)
        ));
    }
    if let Some(oplog) = report.oplog {
        out.push('\n');
        out.push_str(&oplog.to_string());
    }
    out
}

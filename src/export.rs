//! Anonymized CSV export.
//!
//! Joins weekly responses with the non-identifying participant attributes
//! and writes a flat file. Phone numbers, sealed phones, and lookup keys
//! never appear here, by construction of [`ExportRow`].

use std::io::Write;

use crate::store::ExportRow;

const HEADER: &[&str] = &[
    "participant_id",
    "week_start",
    "sick",
    "severity",
    "symptoms",
    "responded_at",
    "uv_exposure",
    "uv_hours_per_week",
    "zip_code",
    "household_size",
];

/// Write the export rows as CSV. Returns the number of data rows written.
pub fn write_csv<W: Write>(rows: &[ExportRow], out: &mut W) -> std::io::Result<usize> {
    writeln!(out, "{}", HEADER.join(","))?;
    for row in rows {
        let fields = [
            row.participant_id.to_string(),
            row.week_start.clone(),
            yes_no(row.sick).to_string(),
            row.severity.map(|s| s.to_string()).unwrap_or_default(),
            row.symptoms.clone().unwrap_or_default(),
            row.responded_at.clone(),
            row.uv_exposure.map(|b| yes_no(b).to_string()).unwrap_or_default(),
            row.uv_hours_per_week
                .map(|h| format_hours(h))
                .unwrap_or_default(),
            row.zip_code.clone().unwrap_or_default(),
            row.household_size.map(|h| h.to_string()).unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(rows.len())
}

fn yes_no(b: bool) -> &'static str {
    if b { "Yes" } else { "No" }
}

/// Whole-number hours print without a trailing `.0`.
fn format_hours(h: f64) -> String {
    if h.fract() == 0.0 {
        format!("{}", h as i64)
    } else {
        format!("{h}")
    }
}

/// Quote a field only when it contains a delimiter, quote, or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

use crate::batch::{BatchReport, RowStatus};
use std::io::{self, Write};

const HEADER: &str = "row,name,file,url,status,error";

/// One CSV line per input row, in row order.
pub fn write_report(report: &BatchReport, mut out: impl Write) -> io::Result<()> {
    writeln!(out, "{HEADER}")?;
    for entry in report.entries() {
        let (status, error) = match &entry.status {
            RowStatus::Ok => ("ok", ""),
            RowStatus::UploadFailed(err) => ("upload_failed", err.as_str()),
            RowStatus::Failed(err) => ("failed", err.as_str()),
        };
        writeln!(
            out,
            "{},{},{},{},{},{}",
            entry.row,
            csv_field(&entry.name),
            csv_field(entry.file.as_deref().unwrap_or_default()),
            csv_field(entry.url.as_deref().unwrap_or_default()),
            status,
            csv_field(error)
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

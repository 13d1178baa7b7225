//! CSV export of the filtered view
//!
//! Fields are wrapped in double quotes and otherwise written verbatim.
//! Embedded quotes are not escaped.

use crate::error::{DashboardError, Result};
use crate::record::Record;
use chrono::NaiveDate;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEADER: &str = "Timestamp,Crash Value,Numeric Value,URL,Created At";

/// Serialize records, refusing an empty set.
pub fn to_csv(records: &[Record]) -> Result<String> {
    if records.is_empty() {
        return Err(DashboardError::NothingToExport);
    }

    let rows: Vec<String> = records.iter().map(row).collect();
    Ok(format!("{}\n{}", HEADER, rows.join("\n")))
}

fn row(record: &Record) -> String {
    format!(
        "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"",
        record.timestamp,
        record.crash_value,
        record.numeric_value_text,
        record.url,
        record.created_at_text
    )
}

/// `crash_data_YYYY-MM-DD.csv`
pub fn file_name(date: NaiveDate) -> String {
    format!("crash_data_{}.csv", date.format("%Y-%m-%d"))
}

/// Write `contents` to `dir/file_name`, creating `dir` if needed.
pub fn write_file(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);

    let mut writer = BufWriter::new(File::create(&path)?);
    writer.write_all(contents.as_bytes())?;
    writer.flush()?;
    drop(writer);

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use chrono::{TimeZone, Utc};

    fn rec(id: i64, value: f64) -> Record {
        Record {
            id: Some(RecordId::Int(id)),
            timestamp: "2025-08-14T10:00:00Z".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 8, 14, 10, 0, 0).unwrap(),
            crash_value: format!("{}x", value),
            numeric_value: value,
            url: "https://bc.game/game/crash".to_string(),
            created_at_text: "2025-08-14T10:00:00+00:00".to_string(),
            numeric_value_text: value.to_string(),
        }
    }

    #[test]
    fn test_empty_view_refused() {
        assert!(matches!(to_csv(&[]), Err(DashboardError::NothingToExport)));
    }

    #[test]
    fn test_header_and_row_count() {
        let csv = to_csv(&[rec(1, 2.35), rec(2, 1.0), rec(3, 10.5)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len() - 1, 3);
        assert_eq!(
            lines[1],
            "\"2025-08-14T10:00:00Z\",\"2.35x\",\"2.35\",\"https://bc.game/game/crash\",\"2025-08-14T10:00:00+00:00\""
        );
        assert_eq!(lines[2].split("\",\"").nth(2), Some("1"));
    }

    #[test]
    fn test_stored_text_written_verbatim() {
        let firebase: Record = serde_json::from_str(
            r#"{
                "timestamp": 1755165600123,
                "created_at": 1755165601000,
                "crash_value": "12.00x",
                "numeric_value": "12.00x",
                "url": "https://bc.game/game/crash"
            }"#,
        )
        .unwrap();
        let supabase: Record = serde_json::from_str(
            r#"{
                "id": 7,
                "timestamp": "2025-08-14T10:00:00Z",
                "created_at": "2025-08-14 10:00:01.456+00",
                "crash_value": "1.05x",
                "numeric_value": 1.05,
                "url": "https://bc.game/game/crash"
            }"#,
        )
        .unwrap();

        let csv = to_csv(&[firebase, supabase]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[1],
            "\"1755165600123\",\"12.00x\",\"12.00x\",\"https://bc.game/game/crash\",\"1755165601000\""
        );
        assert_eq!(
            lines[2],
            "\"2025-08-14T10:00:00Z\",\"1.05x\",\"1.05\",\"https://bc.game/game/crash\",\"2025-08-14 10:00:01.456+00\""
        );
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(file_name(date), "crash_data_2025-01-09.csv");
    }

    #[test]
    fn test_write_file_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");
        let path = write_file(&target, "crash_data_2025-01-09.csv", "a\nb").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a\nb");
    }
}

use crate::domain::stock::StockRecord;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn snapshot_path(data_dir: &Path, country_code: &str) -> PathBuf {
    data_dir.join(format!("{country_code}_stocks.json"))
}

pub fn backup_path(data_dir: &Path, country_code: &str) -> PathBuf {
    data_dir.join(format!("{country_code}_stocks_old.json"))
}

/// Serializes records as a 4-space indented JSON array. Non-ASCII text is kept literal.
pub fn to_json_pretty(records: &[StockRecord]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut ser)
        .context("failed to serialize stock records")?;
    buf.push(b'\n');
    Ok(buf)
}

/// Overwrites the file at `path` with the full record list.
pub fn write_snapshot(path: &Path, records: &[StockRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = to_json_pretty(records)?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Strict read: errors on a missing or malformed file.
pub fn read_snapshot(path: &Path) -> anyhow::Result<Vec<StockRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))
}

/// Lenient read: a missing, unreadable or malformed file is an empty list.
pub fn load_snapshot(path: &Path) -> Vec<StockRecord> {
    match read_snapshot(path) {
        Ok(records) => records,
        Err(err) => {
            if path.exists() {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "snapshot unreadable; using empty list"
                );
            } else {
                tracing::debug!(path = %path.display(), "snapshot missing; using empty list");
            }
            Vec::new()
        }
    }
}

/// Copies the current snapshot to its backup path and returns the records it held.
/// Returns an empty list when there is nothing to back up.
pub fn backup_snapshot(data_dir: &Path, country_code: &str) -> anyhow::Result<Vec<StockRecord>> {
    let current = snapshot_path(data_dir, country_code);
    if !current.exists() {
        return Ok(Vec::new());
    }

    let backup = backup_path(data_dir, country_code);
    std::fs::copy(&current, &backup).with_context(|| {
        format!(
            "failed to copy {} to {}",
            current.display(),
            backup.display()
        )
    })?;
    Ok(load_snapshot(&backup))
}

pub fn last_modified(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{mark_new, sample};

    #[test]
    fn written_snapshot_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), "kr");

        let mut rec = sample("005930");
        rec.company_name = "삼성전자".to_string();
        rec.current_price = "₩71,000".to_string();
        let mut flagged = sample("000660");
        flagged.is_new = Some(true);
        let records = vec![rec, flagged];

        write_snapshot(&path, &records).unwrap();
        assert_eq!(load_snapshot(&path), records);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("삼성전자"), "non-ASCII must not be escaped");
        assert!(text.starts_with("[\n    {\n        \"Ticker\""));
    }

    #[test]
    fn missing_or_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), "us");
        assert!(load_snapshot(&path).is_empty());
        assert!(last_modified(&path).is_none());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot(&path).is_empty());
        assert!(read_snapshot(&path).is_err());

        std::fs::write(&path, r#"{"Ticker": "A"}"#).unwrap();
        assert!(load_snapshot(&path).is_empty());
    }

    #[test]
    fn backup_then_mark_new_flags_added_tickers() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(&snapshot_path(dir.path(), "us"), &[sample("A"), sample("B")]).unwrap();

        let previous = backup_snapshot(dir.path(), "us").unwrap();
        assert!(backup_path(dir.path(), "us").exists());

        let mut current = vec![sample("B"), sample("C")];
        mark_new(&mut current, &previous);
        let flags: Vec<_> = current.iter().map(|r| (r.ticker.as_str(), r.is_new)).collect();
        assert_eq!(flags, vec![("B", Some(false)), ("C", Some(true))]);
    }

    #[test]
    fn backup_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(backup_snapshot(dir.path(), "jp").unwrap().is_empty());
        assert!(!backup_path(dir.path(), "jp").exists());
    }
}

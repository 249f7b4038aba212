use nearhigh_core::domain::country::{CountryConfig, CountryTable};
use nearhigh_core::domain::stock::{mark_new, StockRecord};
use nearhigh_core::storage::snapshot;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PersistOutcome {
    pub path: PathBuf,
    pub written: usize,
    /// `Some` only when new-tracking ran.
    pub new_count: Option<usize>,
}

/// Replaces the country's snapshot with `records`.
///
/// With `track_new`, the previous file is first copied to `<code>_stocks_old.json`
/// and every record is flagged by whether its ticker was in that copy.
pub fn persist(
    data_dir: &Path,
    country_code: &str,
    mut records: Vec<StockRecord>,
    track_new: bool,
) -> anyhow::Result<PersistOutcome> {
    let mut new_count = None;
    if track_new {
        let previous = snapshot::backup_snapshot(data_dir, country_code)?;
        mark_new(&mut records, &previous);
        new_count = Some(records.iter().filter(|r| r.is_new == Some(true)).count());
    }

    let path = snapshot::snapshot_path(data_dir, country_code);
    snapshot::write_snapshot(&path, &records)?;

    Ok(PersistOutcome {
        path,
        written: records.len(),
        new_count,
    })
}

/// Resolves the requested country. `Err` carries the text to print before
/// exiting successfully without a run.
pub fn select_country<'a>(
    table: &'a CountryTable,
    code: Option<&str>,
) -> Result<&'a CountryConfig, String> {
    let Some(code) = code else {
        return Err(usage(table));
    };
    table
        .get(code)
        .ok_or_else(|| format!("unknown country code: {code}\n\n{}", usage(table)))
}

pub fn usage(table: &CountryTable) -> String {
    let mut out = String::from("usage: nearhigh_worker <COUNTRY> [OPTIONS]\n\nvalid country codes:\n");
    for c in table.iter() {
        out.push_str(&format!("  {:<4} {}\n", c.code, c.name));
    }
    out
}

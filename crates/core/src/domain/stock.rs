use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const NOT_AVAILABLE: &str = "N/A";

/// One row of a country snapshot file.
///
/// Field names are the JSON keys the dashboard has always used, so older
/// snapshot files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Industry")]
    pub industry: String,
    #[serde(rename = "Market Cap")]
    pub market_cap: String,
    #[serde(rename = "P/E (TTM)")]
    pub pe_ratio: String,
    #[serde(rename = "Current Price")]
    pub current_price: String,
    #[serde(rename = "52-Week High")]
    pub high_52_week: String,

    /// Set only when the run compared against a previous snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

/// Flags every record whose ticker is absent from `previous`.
///
/// Records present in both snapshots get `Some(false)`, so a file written
/// with new-tracking enabled always carries the flag.
pub fn mark_new(records: &mut [StockRecord], previous: &[StockRecord]) {
    let seen: HashSet<&str> = previous.iter().map(|r| r.ticker.as_str()).collect();
    for record in records.iter_mut() {
        record.is_new = Some(!seen.contains(record.ticker.as_str()));
    }
}

#[cfg(test)]
pub(crate) fn sample(ticker: &str) -> StockRecord {
    StockRecord {
        ticker: ticker.to_string(),
        company_name: format!("{ticker} Inc."),
        sector: "Technology".to_string(),
        industry: "Semiconductors".to_string(),
        market_cap: "1.23T".to_string(),
        pe_ratio: NOT_AVAILABLE.to_string(),
        current_price: "$100.00".to_string(),
        high_52_week: "$101.00".to_string(),
        is_new: None,
    }
}

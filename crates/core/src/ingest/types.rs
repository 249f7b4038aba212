use crate::format::parse_market_cap;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One candidate ticker as returned by a listing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Exchange symbol shown on the dashboard.
    pub ticker: String,
    /// Symbol the quote provider understands (e.g. `005930.KS`). Defaults to `ticker`.
    #[serde(default)]
    pub quote_symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "de_market_cap")]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub pe: Option<String>,
}

impl ListingEntry {
    pub fn new(ticker: impl Into<String>) -> Self {
        let ticker = ticker.into();
        Self {
            quote_symbol: ticker.clone(),
            ticker,
            name: None,
            sector: None,
            industry: None,
            market_cap: None,
            pe: None,
        }
    }

    pub fn symbol_for_quote(&self) -> &str {
        if self.quote_symbol.trim().is_empty() {
            &self.ticker
        } else {
            &self.quote_symbol
        }
    }
}

/// Everything the screen needs to know about one ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteDetail {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub current_price: Option<f64>,
    pub high_52_week: Option<f64>,
    pub history: Vec<DailyBar>,
}

impl QuoteDetail {
    /// Fills metadata the chart did not carry; chart values win.
    pub fn apply_profile(&mut self, profile: QuoteProfile) {
        self.name = self.name.take().or(profile.name);
        self.sector = self.sector.take().or(profile.sector);
        self.industry = self.industry.take().or(profile.industry);
        self.market_cap = self.market_cap.or(profile.market_cap);
        self.trailing_pe = self.trailing_pe.or(profile.trailing_pe);
    }
}

/// Company metadata from a quote-summary lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteProfile {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// Accepts `123.4`, `"123.4"`, `"2.5B"` or null.
fn de_market_cap<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(v)) if v.is_finite() => Some(v),
        Some(Raw::Num(_)) => None,
        Some(Raw::Text(s)) => parse_market_cap(&s),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_entry_accepts_numeric_and_suffixed_caps() {
        let entries: Vec<ListingEntry> = serde_json::from_value(json!([
            {"ticker": "7203", "quote_symbol": "7203.T", "name": "Toyota", "market_cap": 4.1e13},
            {"ticker": "0700", "market_cap": "3.6T"},
            {"ticker": "9999", "market_cap": null}
        ]))
        .unwrap();

        assert_eq!(entries[0].market_cap, Some(4.1e13));
        assert_eq!(entries[0].symbol_for_quote(), "7203.T");
        assert_eq!(entries[1].market_cap, Some(3.6e12));
        assert_eq!(entries[1].symbol_for_quote(), "0700");
        assert_eq!(entries[2].market_cap, None);
    }
}

use crate::config::Settings;
use crate::domain::country::CountryConfig;
use crate::format::parse_market_cap;
use crate::ingest::provider::{
    normalize_entries, with_retries, HttpStatusError, ListingProvider, BROWSER_USER_AGENT,
};
use crate::ingest::types::ListingEntry;
use anyhow::{Context, Result};
use serde::Deserialize;

const SCREENER_URL: &str = "https://api.nasdaq.com/api/screener/stocks";

/// US listing from the nasdaq.com stock screener, one exchange at a time.
#[derive(Debug, Clone)]
pub struct NasdaqScreener {
    http: reqwest::Client,
    exchange: String,
    retries: u32,
}

impl NasdaqScreener {
    pub fn new(http: reqwest::Client, exchange: impl Into<String>, retries: u32) -> Self {
        Self {
            http,
            exchange: exchange.into(),
            retries,
        }
    }

    pub fn from_settings(settings: &Settings, exchange: impl Into<String>) -> Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            exchange,
            settings.provider_retries,
        ))
    }

    async fn fetch_once(&self) -> Result<String> {
        let res = self
            .http
            .get(SCREENER_URL)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", "application/json, text/plain, */*")
            .query(&[
                ("tableonly", "true"),
                ("download", "true"),
                ("exchange", self.exchange.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(HttpStatusError { status, body: text }.into());
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ListingProvider for NasdaqScreener {
    fn provider_name(&self) -> &'static str {
        "nasdaq_screener"
    }

    async fn fetch_listing(&self, country: &CountryConfig) -> Result<Vec<ListingEntry>> {
        let text = with_retries(self.retries, "nasdaq_screener", || self.fetch_once())
            .await
            .with_context(|| format!("nasdaq screener request failed ({})", self.exchange))?;

        let entries = parse_screener_response(&text)?;
        tracing::info!(
            country = %country.code,
            exchange = %self.exchange,
            rows = entries.len(),
            "loaded nasdaq screener rows"
        );
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    data: Option<ScreenerData>,
}

#[derive(Debug, Deserialize)]
struct ScreenerData {
    #[serde(default)]
    rows: Vec<ScreenerRow>,
}

#[derive(Debug, Deserialize)]
struct ScreenerRow {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "marketCap")]
    market_cap: String,
    #[serde(default)]
    sector: String,
    #[serde(default)]
    industry: String,
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn parse_screener_response(text: &str) -> Result<Vec<ListingEntry>> {
    let parsed: ScreenerResponse =
        serde_json::from_str(text).context("failed to parse nasdaq screener response")?;
    let rows = parsed
        .data
        .context("nasdaq screener response has no data")?
        .rows;

    let entries = rows
        .into_iter()
        // Preferred shares, warrants and units come through as `ABC^A` / `ABC/WS`.
        .filter(|row| !row.symbol.contains(['^', '/']))
        .map(|row| {
            let mut entry = ListingEntry::new(row.symbol);
            entry.name = non_empty(row.name);
            entry.sector = non_empty(row.sector);
            entry.industry = non_empty(row.industry);
            entry.market_cap = parse_market_cap(&row.market_cap).filter(|v| *v > 0.0);
            entry
        })
        .collect();

    Ok(normalize_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_screener_rows() {
        let body = r#"{
            "data": {
                "headers": {"symbol": "Symbol"},
                "rows": [
                    {"symbol": "AAPL", "name": "Apple Inc. Common Stock", "lastsale": "$227.52",
                     "marketCap": "3,458,996,843,520.00", "sector": "Technology",
                     "industry": "Computer Manufacturing"},
                    {"symbol": "ABCD^A", "name": "Preferred", "marketCap": "1,000.00",
                     "sector": "", "industry": ""},
                    {"symbol": "TINY", "name": "Tiny Corp", "marketCap": "0.00",
                     "sector": "", "industry": ""}
                ]
            },
            "message": null
        }"#;

        let entries = parse_screener_response(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ticker, "AAPL");
        assert_eq!(entries[0].quote_symbol, "AAPL");
        assert_eq!(entries[0].sector.as_deref(), Some("Technology"));
        assert_eq!(entries[0].market_cap, Some(3_458_996_843_520.0));
        assert_eq!(entries[1].ticker, "TINY");
        assert_eq!(entries[1].market_cap, None);
        assert_eq!(entries[1].sector, None);
    }

    #[test]
    fn missing_data_is_an_error() {
        assert!(parse_screener_response(r#"{"data": null}"#).is_err());
    }
}

use crate::config::Settings;
use crate::domain::country::CountryConfig;
use crate::format::format_pe;
use crate::ingest::provider::{normalize_entries, with_retries, ListingProvider};
use crate::ingest::types::ListingEntry;
use crate::ingest::yahoo_session::YahooSession;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

/// Largest page the screener endpoint serves.
const PAGE_SIZE: usize = 250;
/// Row cap when a country screens its whole listing.
const MAX_ROWS: usize = 10_000;

/// Regional equity listing from the Yahoo Finance screener, largest market caps first.
#[derive(Debug)]
pub struct YahooScreener {
    session: YahooSession,
    region: String,
    retries: u32,
}

impl YahooScreener {
    pub fn new(session: YahooSession, region: impl Into<String>, retries: u32) -> Self {
        Self {
            session,
            region: region.into(),
            retries,
        }
    }

    pub fn from_settings(settings: &Settings, region: impl Into<String>) -> Result<Self> {
        let session = YahooSession::new(settings.http_client()?, settings.quote_base_url.clone());
        Ok(Self::new(session, region, settings.provider_retries))
    }

    async fn fetch_page(&self, offset: usize, size: usize) -> Result<ScreenerPage> {
        let url = format!(
            "{}/v1/finance/screener?formatted=false&lang=en-US",
            self.session.base_url()
        );
        let body = screener_query(&self.region, offset, size);
        let text = with_retries(self.retries, "yahoo_screener", || {
            self.session.post_json_text(&url, &body)
        })
        .await?;
        parse_screener_page(&text)
    }
}

#[async_trait::async_trait]
impl ListingProvider for YahooScreener {
    fn provider_name(&self) -> &'static str {
        "yahoo_screener"
    }

    async fn fetch_listing(&self, country: &CountryConfig) -> Result<Vec<ListingEntry>> {
        let wanted = country.top_n.unwrap_or(MAX_ROWS).min(MAX_ROWS);
        let mut out = Vec::with_capacity(wanted);

        while out.len() < wanted {
            let offset = out.len();
            let page = self
                .fetch_page(offset, PAGE_SIZE.min(wanted - offset))
                .await
                .with_context(|| {
                    format!("yahoo screener request failed ({} @ {offset})", self.region)
                })?;

            let fetched = page.entries.len();
            out.extend(page.entries);
            tracing::debug!(
                country = %country.code,
                region = %self.region,
                offset,
                fetched,
                total = page.total,
                "loaded yahoo screener page"
            );
            if fetched == 0 || out.len() >= page.total {
                break;
            }
        }

        tracing::info!(
            country = %country.code,
            region = %self.region,
            rows = out.len(),
            "loaded yahoo screener rows"
        );
        Ok(normalize_entries(out))
    }
}

fn screener_query(region: &str, offset: usize, size: usize) -> serde_json::Value {
    json!({
        "offset": offset,
        "size": size,
        "sortField": "intradaymarketcap",
        "sortType": "DESC",
        "quoteType": "EQUITY",
        "query": {
            "operator": "AND",
            "operands": [
                {"operator": "EQ", "operands": ["region", region]}
            ]
        },
        "userId": "",
        "userIdType": "guid"
    })
}

#[derive(Debug)]
struct ScreenerPage {
    entries: Vec<ListingEntry>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ScreenerEnvelope {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    result: Option<Vec<ScreenerResult>>,
    error: Option<ScreenerError>,
}

#[derive(Debug, Deserialize)]
struct ScreenerError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenerQuote {
    symbol: String,
    long_name: Option<String>,
    short_name: Option<String>,
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    quote_type: Option<String>,
}

impl ScreenerQuote {
    fn into_entry(self) -> ListingEntry {
        // "7203.T" lists as 7203, "0700.HK" as 0700.
        let ticker = self
            .symbol
            .rsplit_once('.')
            .map_or(self.symbol.as_str(), |(head, _)| head)
            .to_string();

        let mut entry = ListingEntry::new(ticker);
        entry.quote_symbol = self.symbol;
        entry.name = self
            .long_name
            .or(self.short_name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        entry.market_cap = self.market_cap.filter(|v| v.is_finite() && *v > 0.0);
        entry.pe = self
            .trailing_pe
            .filter(|v| v.is_finite())
            .map(|v| format_pe(Some(v)));
        entry
    }
}

fn parse_screener_page(text: &str) -> Result<ScreenerPage> {
    let envelope: ScreenerEnvelope =
        serde_json::from_str(text).context("screener body is not JSON")?;

    if let Some(err) = envelope.finance.error {
        anyhow::bail!("screener error {}: {}", err.code, err.description);
    }

    let result = envelope
        .finance
        .result
        .and_then(|r| r.into_iter().next())
        .context("screener response has no result")?;

    let entries = result
        .quotes
        .into_iter()
        .filter(|q| q.quote_type.as_deref().map_or(true, |t| t == "EQUITY"))
        .map(ScreenerQuote::into_entry)
        .collect();

    Ok(ScreenerPage {
        entries,
        total: result.total,
    })
}

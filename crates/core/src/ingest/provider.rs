use crate::config::Settings;
use crate::domain::country::CountryConfig;
use crate::ingest::types::{ListingEntry, QuoteDetail, QuoteProfile};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Screener endpoints reject non-browser user agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[async_trait::async_trait]
pub trait ListingProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_listing(&self, country: &CountryConfig) -> Result<Vec<ListingEntry>>;
}

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteDetail>;

    /// Company metadata, fetched only for tickers that passed the price screen.
    /// Providers without a profile source return an empty profile.
    async fn fetch_profile(&self, _symbol: &str) -> Result<QuoteProfile> {
        Ok(QuoteProfile::default())
    }
}

/// Error carrying an HTTP status so retry logic can tell throttling from bad requests.
#[derive(Debug)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub body: String,
}

impl std::fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body: String = self.body.chars().take(200).collect();
        write!(f, "HTTP {}: {}", self.status, body)
    }
}

impl std::error::Error for HttpStatusError {}

fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<HttpStatusError>() {
        return e.status == StatusCode::TOO_MANY_REQUESTS || e.status.is_server_error();
    }
    err.downcast_ref::<reqwest::Error>().is_some()
}

/// Runs `op` up to `attempts` times with 1s, 2s, 4s... backoff between retryable failures.
pub async fn with_retries<T, F, Fut>(attempts: u32, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let backoff = Duration::from_secs(1u64 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?backoff, label, error = %err, "request failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// GET `url` and return the body, mapping non-2xx to [`HttpStatusError`].
pub async fn get_text(http: &reqwest::Client, url: &str) -> Result<String> {
    let res = http
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(HttpStatusError { status, body: text }.into());
    }
    Ok(text)
}

/// Drops blank tickers, trims them, and keeps the first entry per ticker.
pub fn normalize_entries(entries: Vec<ListingEntry>) -> Vec<ListingEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for mut entry in entries {
        entry.ticker = entry.ticker.trim().to_string();
        entry.quote_symbol = entry.quote_symbol.trim().to_string();
        if entry.ticker.is_empty() {
            continue;
        }
        if entry.quote_symbol.is_empty() {
            entry.quote_symbol = entry.ticker.clone();
        }
        if seen.insert(entry.ticker.clone()) {
            out.push(entry);
        }
    }
    out
}

/// Listing served as a JSON array of [`ListingEntry`] from an arbitrary URL.
#[derive(Debug, Clone)]
pub struct HttpJsonListing {
    http: reqwest::Client,
    url: String,
    retries: u32,
}

impl HttpJsonListing {
    pub fn new(http: reqwest::Client, url: impl Into<String>, retries: u32) -> Self {
        Self {
            http,
            url: url.into(),
            retries,
        }
    }

    pub fn from_settings(settings: &Settings, url: impl Into<String>) -> Result<Self> {
        Ok(Self::new(settings.http_client()?, url, settings.provider_retries))
    }
}

#[async_trait::async_trait]
impl ListingProvider for HttpJsonListing {
    fn provider_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch_listing(&self, country: &CountryConfig) -> Result<Vec<ListingEntry>> {
        let text = with_retries(self.retries, "listing", || get_text(&self.http, &self.url))
            .await
            .with_context(|| format!("listing request failed for {}", country.code))?;

        let entries = serde_json::from_str::<Vec<ListingEntry>>(&text)
            .context("listing response is not a JSON array of entries")?;
        Ok(normalize_entries(entries))
    }
}

/// Listing read from a local JSON file with the same shape as [`HttpJsonListing`].
#[derive(Debug, Clone)]
pub struct FileListing {
    path: PathBuf,
}

impl FileListing {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ListingProvider for FileListing {
    fn provider_name(&self) -> &'static str {
        "file"
    }

    async fn fetch_listing(&self, _country: &CountryConfig) -> Result<Vec<ListingEntry>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read listing file {}", self.path.display()))?;
        let entries = serde_json::from_str::<Vec<ListingEntry>>(&text)
            .with_context(|| format!("invalid listing file {}", self.path.display()))?;
        Ok(normalize_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::country::CountryTable;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn normalize_drops_blank_and_duplicate_tickers() {
        let mut dup = ListingEntry::new("AAPL");
        dup.name = Some("second".to_string());
        let mut blank_symbol = ListingEntry::new(" MSFT ");
        blank_symbol.quote_symbol = String::new();

        let out = normalize_entries(vec![
            ListingEntry::new("AAPL"),
            ListingEntry::new("  "),
            dup,
            blank_symbol,
        ]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ticker, "AAPL");
        assert_eq!(out[0].name, None);
        assert_eq!(out[1].ticker, "MSFT");
        assert_eq!(out[1].quote_symbol, "MSFT");
    }

    #[tokio::test]
    async fn retries_only_retryable_errors() {
        let calls = AtomicU32::new(0);
        let res: Result<()> = with_retries(3, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HttpStatusError {
                status: StatusCode::NOT_FOUND,
                body: "missing".to_string(),
            }
            .into())
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn file_listing_reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jp_listing.json");
        std::fs::write(
            &path,
            r#"[{"ticker": "7203", "quote_symbol": "7203.T", "name": "トヨタ自動車", "market_cap": "41T"}]"#,
        )
        .unwrap();

        let table = CountryTable::builtin();
        let jp = table.get("jp").unwrap();
        let entries = FileListing::new(&path).fetch_listing(jp).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("トヨタ自動車"));
        assert_eq!(entries[0].market_cap, Some(41.0e12));
    }
}

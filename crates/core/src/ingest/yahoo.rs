use crate::config::Settings;
use crate::ingest::provider::{get_text, with_retries, QuoteProvider};
use crate::ingest::types::{DailyBar, QuoteDetail, QuoteProfile};
use crate::ingest::yahoo_session::YahooSession;
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::sync::Arc;

const PROFILE_MODULES: &str = "price,summaryDetail,assetProfile";

/// Quote provider backed by the Yahoo Finance chart endpoint (one year of daily bars),
/// with company profiles from the quote-summary endpoint.
#[derive(Debug, Clone)]
pub struct YahooChart {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    session: Arc<YahooSession>,
}

impl YahooChart {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, retries: u32) -> Self {
        let base_url = base_url.into();
        Self {
            session: Arc::new(YahooSession::new(http.clone(), base_url.clone())),
            http,
            base_url,
            retries,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            settings.quote_base_url.clone(),
            settings.provider_retries,
        ))
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d",
            self.base_url.trim_end_matches('/'),
            symbol
        )
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooChart {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<QuoteDetail> {
        let url = self.url(symbol);
        let text = with_retries(self.retries, "yahoo_chart", || get_text(&self.http, &url))
            .await
            .with_context(|| format!("chart request failed for {symbol}"))?;
        parse_chart(&text).with_context(|| format!("invalid chart response for {symbol}"))
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<QuoteProfile> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}",
            self.session.base_url(),
            symbol,
            PROFILE_MODULES
        );
        let text = with_retries(self.retries, "yahoo_summary", || self.session.get_text(&url))
            .await
            .with_context(|| format!("quote summary request failed for {symbol}"))?;
        parse_summary(&text).with_context(|| format!("invalid quote summary for {symbol}"))
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    fifty_two_week_high: Option<f64>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn parse_chart(text: &str) -> Result<QuoteDetail> {
    let envelope: ChartEnvelope = serde_json::from_str(text).context("chart body is not JSON")?;

    if let Some(err) = envelope.chart.error {
        anyhow::bail!("chart error {}: {}", err.code, err.description);
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response has no result")?;

    let series = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten().filter(|x| x.is_finite());

    let history: Vec<DailyBar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(DailyBar {
                date,
                high: at(&series.high, i),
                low: at(&series.low, i),
                close: at(&series.close, i),
            })
        })
        .filter(|bar| bar.high.is_some() || bar.close.is_some())
        .collect();

    let last_close = history.iter().rev().find_map(|b| b.close);
    let high_52_week = max_of(&history, |b| b.high)
        .or_else(|| max_of(&history, |b| b.close))
        .or(result.meta.fifty_two_week_high);

    let name = result
        .meta
        .long_name
        .or(result.meta.short_name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(QuoteDetail {
        name,
        current_price: result.meta.regular_market_price.or(last_close),
        high_52_week,
        history,
        ..QuoteDetail::default()
    })
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    asset_profile: Option<AssetProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
    market_cap: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawNumber>,
    market_cap: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

/// Yahoo's `{"raw": 1.0, "fmt": "1.00"}` wrapper; absent values arrive as `{}`.
#[derive(Debug, Deserialize)]
struct RawNumber {
    raw: Option<f64>,
}

impl RawNumber {
    fn value(value: Option<RawNumber>) -> Option<f64> {
        value.and_then(|v| v.raw).filter(|v| v.is_finite())
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_summary(text: &str) -> Result<QuoteProfile> {
    let envelope: SummaryEnvelope =
        serde_json::from_str(text).context("quote summary body is not JSON")?;

    if let Some(err) = envelope.quote_summary.error {
        anyhow::bail!("quote summary error {}: {}", err.code, err.description);
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .context("quote summary has no result")?;

    let (name, price_cap) = match result.price {
        Some(p) => (
            non_blank(p.long_name).or(non_blank(p.short_name)),
            RawNumber::value(p.market_cap),
        ),
        None => (None, None),
    };
    let (trailing_pe, detail_cap) = match result.summary_detail {
        Some(d) => (RawNumber::value(d.trailing_pe), RawNumber::value(d.market_cap)),
        None => (None, None),
    };
    let (sector, industry) = match result.asset_profile {
        Some(a) => (non_blank(a.sector), non_blank(a.industry)),
        None => (None, None),
    };

    Ok(QuoteProfile {
        name,
        sector,
        industry,
        market_cap: price_cap.or(detail_cap).filter(|v| *v > 0.0),
        trailing_pe,
    })
}

fn max_of(history: &[DailyBar], field: impl Fn(&DailyBar) -> Option<f64>) -> Option<f64> {
    history.iter().filter_map(field).reduce(f64::max)
}

use crate::domain::country::{CountryConfig, Threshold};
use crate::domain::stock::{StockRecord, NOT_AVAILABLE};
use crate::format::{format_market_cap, format_pe, format_price};
use crate::ingest::provider::{ListingProvider, QuoteProvider};
use crate::ingest::types::{ListingEntry, QuoteDetail};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Fetch(String),
    EmptyHistory,
    MissingField(&'static str),
    InvalidField(&'static str),
}

impl SkipReason {
    /// Stable label for counting.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Fetch(_) => "fetch",
            SkipReason::EmptyHistory => "empty_history",
            SkipReason::MissingField(_) => "missing_field",
            SkipReason::InvalidField(_) => "invalid_field",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            SkipReason::EmptyHistory => write!(f, "empty price history"),
            SkipReason::MissingField(name) => write!(f, "missing {name}"),
            SkipReason::InvalidField(name) => write!(f, "invalid {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Kept(StockRecord),
    BelowThreshold { ticker: String, ratio: f64 },
    Skipped { ticker: String, reason: SkipReason },
}

#[derive(Debug, Clone)]
pub struct ScreenOptions {
    pub threshold: Threshold,
    pub top_n: Option<usize>,
    /// Pause between quote requests.
    pub req_delay: Duration,
    /// Log progress every N candidates; 0 disables.
    pub progress_every: usize,
}

impl ScreenOptions {
    pub fn for_country(country: &CountryConfig) -> Self {
        Self {
            threshold: country.threshold,
            top_n: country.top_n,
            req_delay: Duration::ZERO,
            progress_every: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenReport {
    pub records: Vec<StockRecord>,
    pub listed: usize,
    pub candidates: usize,
    pub below_threshold: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    /// Set when the listing could not be fetched and the pass ran on nothing.
    pub listing_error: Option<String>,
}

impl ScreenReport {
    pub fn kept(&self) -> usize {
        self.records.len()
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

pub fn is_near_high(current: f64, high_52_week: f64, threshold: Threshold) -> bool {
    current >= high_52_week * threshold.value()
}

/// Keeps the `top_n` largest entries by market cap; unknown caps sort last in listing order.
/// A listing with no caps at all cannot be ranked and is kept whole.
pub fn cap_filter(mut entries: Vec<ListingEntry>, top_n: Option<usize>) -> Vec<ListingEntry> {
    let Some(n) = top_n else {
        return entries;
    };
    if entries.len() > n && entries.iter().all(|e| e.market_cap.is_none()) {
        tracing::warn!(
            listed = entries.len(),
            top_n = n,
            "listing has no market caps; screening every entry"
        );
        return entries;
    }

    entries.sort_by(|a, b| match (a.market_cap, b.market_cap) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    entries.truncate(n);
    entries
}

/// Cheap pre-check on chart data so profiles are only fetched for likely keeps.
fn passes_price_screen(quote: &QuoteDetail, threshold: Threshold) -> bool {
    match (quote.current_price, quote.high_52_week) {
        (Some(current), Some(high)) if high > 0.0 && !quote.history.is_empty() => {
            is_near_high(current, high, threshold)
        }
        _ => false,
    }
}

fn needs_profile(entry: &ListingEntry) -> bool {
    entry.sector.is_none()
        || entry.industry.is_none()
        || entry.market_cap.is_none()
        || entry.pe.is_none()
}

fn pick(primary: &Option<String>, fallback: &Option<String>) -> String {
    primary
        .as_deref()
        .or(fallback.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// Applies the near-high predicate to one fetched candidate.
pub fn evaluate(
    entry: &ListingEntry,
    quote: &QuoteDetail,
    country: &CountryConfig,
    threshold: Threshold,
) -> CandidateOutcome {
    let skip = |reason| CandidateOutcome::Skipped {
        ticker: entry.ticker.clone(),
        reason,
    };

    if quote.history.is_empty() {
        return skip(SkipReason::EmptyHistory);
    }
    let Some(current) = quote.current_price else {
        return skip(SkipReason::MissingField("current price"));
    };
    let Some(high) = quote.high_52_week else {
        return skip(SkipReason::MissingField("52-week high"));
    };
    if !current.is_finite() || current <= 0.0 {
        return skip(SkipReason::InvalidField("current price"));
    }
    if !high.is_finite() || high <= 0.0 {
        return skip(SkipReason::InvalidField("52-week high"));
    }

    if !is_near_high(current, high, threshold) {
        return CandidateOutcome::BelowThreshold {
            ticker: entry.ticker.clone(),
            ratio: current / high,
        };
    }

    let pe_ratio = match entry.pe.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(pe) => pe.to_string(),
        None => format_pe(quote.trailing_pe),
    };

    CandidateOutcome::Kept(StockRecord {
        ticker: entry.ticker.clone(),
        company_name: pick(&entry.name, &quote.name),
        sector: pick(&entry.sector, &quote.sector),
        industry: pick(&entry.industry, &quote.industry),
        market_cap: format_market_cap(entry.market_cap.or(quote.market_cap), &country.currency),
        pe_ratio,
        current_price: format_price(current, &country.currency, country.price_decimals),
        high_52_week: format_price(high, &country.currency, country.price_decimals),
        is_new: None,
    })
}

/// Full updater pass for one country. Never fails: a listing error yields an
/// empty report and per-candidate errors are counted as skips.
pub async fn run_screen(
    country: &CountryConfig,
    listing: &dyn ListingProvider,
    quotes: &dyn QuoteProvider,
    opts: &ScreenOptions,
) -> ScreenReport {
    let mut report = ScreenReport::default();

    let entries = match listing.fetch_listing(country).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(
                country = %country.code,
                provider = listing.provider_name(),
                error = %err,
                "listing fetch failed; continuing with zero candidates"
            );
            report.listing_error = Some(format!("{err:#}"));
            Vec::new()
        }
    };
    report.listed = entries.len();

    let candidates = cap_filter(entries, opts.top_n);
    report.candidates = candidates.len();
    tracing::info!(
        country = %country.code,
        provider = listing.provider_name(),
        listed = report.listed,
        candidates = report.candidates,
        threshold = %opts.threshold,
        "screening candidates"
    );

    let total = candidates.len();
    let mut logged_failures: usize = 0;

    for (idx, entry) in candidates.iter().enumerate() {
        if idx != 0 && !opts.req_delay.is_zero() {
            tokio::time::sleep(opts.req_delay).await;
        }

        let symbol = entry.symbol_for_quote();
        let outcome = match quotes.fetch_quote(symbol).await {
            Ok(mut quote) => {
                if passes_price_screen(&quote, opts.threshold) && needs_profile(entry) {
                    if !opts.req_delay.is_zero() {
                        tokio::time::sleep(opts.req_delay).await;
                    }
                    match quotes.fetch_profile(symbol).await {
                        Ok(profile) => quote.apply_profile(profile),
                        Err(err) => tracing::debug!(
                            ticker = %entry.ticker,
                            error = %format!("{err:#}"),
                            "profile fetch failed; keeping listing metadata"
                        ),
                    }
                }
                evaluate(entry, &quote, country, opts.threshold)
            }
            Err(err) => CandidateOutcome::Skipped {
                ticker: entry.ticker.clone(),
                reason: SkipReason::Fetch(format!("{err:#}")),
            },
        };

        match outcome {
            CandidateOutcome::Kept(record) => {
                tracing::info!(
                    idx = idx + 1,
                    total,
                    ticker = %record.ticker,
                    price = %record.current_price,
                    high = %record.high_52_week,
                    "near 52-week high"
                );
                report.records.push(record);
            }
            CandidateOutcome::BelowThreshold { ticker, ratio } => {
                tracing::debug!(%ticker, ratio, "below threshold");
                report.below_threshold += 1;
            }
            CandidateOutcome::Skipped { ticker, reason } => {
                *report.skipped.entry(reason.kind()).or_default() += 1;
                if logged_failures < 10 {
                    tracing::warn!(%ticker, reason = %reason, "skipping candidate");
                    logged_failures += 1;
                } else {
                    tracing::debug!(%ticker, reason = %reason, "skipping candidate");
                }
            }
        }

        if opts.progress_every != 0 {
            let n = idx + 1;
            if n == total || n % opts.progress_every == 0 {
                tracing::info!(
                    processed = n,
                    total,
                    kept = report.kept(),
                    skipped = report.skipped_total(),
                    country = %country.code,
                    "screen progress"
                );
            }
        }
    }

    report
}

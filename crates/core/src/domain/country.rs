use crate::ingest::kis::KisMarket;
use anyhow::ensure;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_THRESHOLD: f64 = 0.98;

/// Fraction of the 52-week high a price must reach to be kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(v: f64) -> anyhow::Result<Self> {
        ensure!(
            v.is_finite() && v > 0.0 && v <= 1.0,
            "threshold must be in (0, 1] (got {v})"
        );
        Ok(Self(v))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Where a country's candidate tickers come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingSource {
    NasdaqScreener { exchange: String },
    /// Yahoo Finance regional equity screener, e.g. `jp` or `hk`.
    YahooScreener { region: String },
    KisMaster { markets: Vec<KisMarket> },
    HttpJson { url: String },
    /// Relative paths resolve against the data directory.
    File { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CountryConfig {
    pub code: String,
    pub name: String,
    pub currency: String,
    pub price_decimals: usize,
    pub top_n: Option<usize>,
    pub threshold: Threshold,
    pub listing: ListingSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryEntry {
    pub code: String,
    pub name: String,
}

/// Immutable per-country configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct CountryTable {
    rows: Vec<CountryConfig>,
    default_idx: usize,
}

impl CountryTable {
    pub fn builtin() -> Self {
        let rows = vec![
            CountryConfig {
                code: "us".to_string(),
                name: "미국 (USA)".to_string(),
                currency: "$".to_string(),
                price_decimals: 2,
                top_n: Some(500),
                threshold: Threshold::default(),
                listing: ListingSource::NasdaqScreener {
                    exchange: "nasdaq".to_string(),
                },
            },
            CountryConfig {
                code: "jp".to_string(),
                name: "일본 (Japan)".to_string(),
                currency: "¥".to_string(),
                price_decimals: 0,
                top_n: Some(1000),
                threshold: Threshold::default(),
                listing: ListingSource::YahooScreener {
                    region: "jp".to_string(),
                },
            },
            CountryConfig {
                code: "hk".to_string(),
                name: "홍콩 (Hong Kong)".to_string(),
                currency: "HK$".to_string(),
                price_decimals: 2,
                top_n: Some(500),
                threshold: Threshold::default(),
                listing: ListingSource::YahooScreener {
                    region: "hk".to_string(),
                },
            },
            CountryConfig {
                code: "kr".to_string(),
                name: "한국 (Korea)".to_string(),
                currency: "₩".to_string(),
                price_decimals: 0,
                top_n: Some(1000),
                threshold: Threshold::default(),
                listing: ListingSource::KisMaster {
                    markets: vec![KisMarket::Kospi, KisMarket::Kosdaq],
                },
            },
        ];

        let default_idx = rows
            .iter()
            .position(|c| c.code == DEFAULT_COUNTRY)
            .unwrap_or(0);

        Self { rows, default_idx }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `NEAR_HIGH_THRESHOLD` and `COUNTRY_<CODE>_*` overrides on top of the built-in rows.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut table = Self::builtin();

        let global_threshold = lookup("NEAR_HIGH_THRESHOLD")
            .and_then(|s| parse_threshold("NEAR_HIGH_THRESHOLD", &s));

        for row in &mut table.rows {
            let prefix = format!("COUNTRY_{}", row.code.to_ascii_uppercase());

            if let Some(t) = global_threshold {
                row.threshold = t;
            }

            let key = format!("{prefix}_THRESHOLD");
            if let Some(t) = lookup(&key).and_then(|s| parse_threshold(&key, &s)) {
                row.threshold = t;
            }

            let key = format!("{prefix}_TOP_N");
            if let Some(s) = lookup(&key) {
                match s.trim().parse::<usize>() {
                    Ok(0) => row.top_n = None,
                    Ok(n) => row.top_n = Some(n),
                    Err(_) => {
                        tracing::warn!(key = %key, value = %s, "ignoring invalid top-n override")
                    }
                }
            }

            let listing_url = lookup(&format!("{prefix}_LISTING_URL")).filter(|s| !s.trim().is_empty());
            let listing_file = lookup(&format!("{prefix}_LISTING_FILE")).filter(|s| !s.trim().is_empty());
            if let Some(url) = listing_url {
                row.listing = ListingSource::HttpJson {
                    url: url.trim().to_string(),
                };
            } else if let Some(path) = listing_file {
                row.listing = ListingSource::File {
                    path: PathBuf::from(path.trim()),
                };
            }
        }

        table
    }

    pub fn get(&self, code: &str) -> Option<&CountryConfig> {
        let code = code.trim();
        self.rows.iter().find(|c| c.code.eq_ignore_ascii_case(code))
    }

    pub fn default_country(&self) -> &CountryConfig {
        &self.rows[self.default_idx]
    }

    /// Falls back to the default country on unknown or missing codes.
    pub fn resolve(&self, code: Option<&str>) -> &CountryConfig {
        code.and_then(|c| self.get(c))
            .unwrap_or_else(|| self.default_country())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountryConfig> {
        self.rows.iter()
    }

    pub fn entries(&self) -> Vec<CountryEntry> {
        self.rows
            .iter()
            .map(|c| CountryEntry {
                code: c.code.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn codes(&self) -> Vec<&str> {
        self.rows.iter().map(|c| c.code.as_str()).collect()
    }
}

fn parse_threshold(key: &str, raw: &str) -> Option<Threshold> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(anyhow::Error::from)
        .and_then(Threshold::new);
    match parsed {
        Ok(t) => Some(t),
        Err(err) => {
            tracing::warn!(
                key = %key,
                value = %raw,
                error = %err,
                "ignoring invalid threshold override"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table_with(vars: &[(&str, &str)]) -> CountryTable {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CountryTable::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn threshold_rejects_out_of_range() {
        assert!(Threshold::new(0.0).is_err());
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert!(Threshold::new(1.0).is_ok());
        assert!(Threshold::new(0.7).is_ok());
    }

    #[test]
    fn unknown_code_resolves_to_default() {
        let table = CountryTable::builtin();
        assert_eq!(table.resolve(Some("zz")).code, "us");
        assert_eq!(table.resolve(None).code, "us");
        assert_eq!(table.resolve(Some("KR")).code, "kr");
    }

    #[test]
    fn entries_keep_display_order() {
        let table = CountryTable::builtin();
        assert_eq!(table.codes(), vec!["us", "jp", "hk", "kr"]);
        assert_eq!(table.entries()[3].name, "한국 (Korea)");
    }

    #[test]
    fn env_overrides_apply_per_country() {
        let table = table_with(&[
            ("NEAR_HIGH_THRESHOLD", "0.9"),
            ("COUNTRY_KR_THRESHOLD", "0.7"),
            ("COUNTRY_US_TOP_N", "0"),
            ("COUNTRY_JP_TOP_N", "2000"),
            ("COUNTRY_HK_LISTING_URL", "https://example.test/hk.json"),
        ]);

        assert_eq!(table.get("us").unwrap().threshold.value(), 0.9);
        assert_eq!(table.get("kr").unwrap().threshold.value(), 0.7);
        assert_eq!(table.get("us").unwrap().top_n, None);
        assert_eq!(table.get("jp").unwrap().top_n, Some(2000));
        assert_eq!(
            table.get("hk").unwrap().listing,
            ListingSource::HttpJson {
                url: "https://example.test/hk.json".to_string()
            }
        );
    }

    #[test]
    fn every_builtin_country_has_a_remote_listing() {
        let table = CountryTable::builtin();
        assert_eq!(
            table.get("jp").unwrap().listing,
            ListingSource::YahooScreener {
                region: "jp".to_string()
            }
        );
        assert_eq!(
            table.get("hk").unwrap().listing,
            ListingSource::YahooScreener {
                region: "hk".to_string()
            }
        );
        assert!(table
            .iter()
            .all(|c| !matches!(c.listing, ListingSource::File { .. })));
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let table = table_with(&[
            ("COUNTRY_US_THRESHOLD", "1.5"),
            ("COUNTRY_US_TOP_N", "lots"),
        ]);
        let us = table.get("us").unwrap();
        assert_eq!(us.threshold, Threshold::default());
        assert_eq!(us.top_n, Some(500));
    }
}

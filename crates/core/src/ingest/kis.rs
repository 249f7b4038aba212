use crate::config::Settings;
use crate::domain::country::CountryConfig;
use crate::ingest::provider::{normalize_entries, ListingProvider};
use crate::ingest::types::ListingEntry;
use anyhow::{Context, Result};
use encoding_rs::EUC_KR;

const KOSPI_MASTER_ZIP: &str =
    "https://new.real.download.dws.co.kr/common/master/kospi_code.mst.zip";
const KOSDAQ_MASTER_ZIP: &str =
    "https://new.real.download.dws.co.kr/common/master/kosdaq_code.mst.zip";
const KONEX_MASTER_ZIP: &str =
    "https://new.real.download.dws.co.kr/common/master/konex_code.mst.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KisMarket {
    Kospi,
    Kosdaq,
    Konex,
}

impl KisMarket {
    fn master_url(self) -> &'static str {
        match self {
            KisMarket::Kospi => KOSPI_MASTER_ZIP,
            KisMarket::Kosdaq => KOSDAQ_MASTER_ZIP,
            KisMarket::Konex => KONEX_MASTER_ZIP,
        }
    }

    /// Width of the fixed-width field block that closes every master line,
    /// starting with the two-byte security group code.
    fn tail_len(self) -> Option<usize> {
        match self {
            KisMarket::Kospi => Some(227),
            KisMarket::Kosdaq => Some(221),
            KisMarket::Konex => None,
        }
    }

    /// Yahoo-style suffix for quotes on this market.
    fn quote_suffix(self) -> &'static str {
        match self {
            KisMarket::Kosdaq => ".KQ",
            KisMarket::Kospi | KisMarket::Konex => ".KS",
        }
    }
}

/// Korean listing built from the Korea Investment & Securities stock master files.
///
/// Only equity groups are kept (no ETFs, ETNs or funds). KOSPI and KOSDAQ lines
/// carry the previous-day market cap, which feeds the top-N ranking.
#[derive(Debug)]
pub struct KisMasterListing {
    http: reqwest::Client,
    markets: Vec<KisMarket>,
}

impl KisMasterListing {
    pub fn new(http: reqwest::Client, markets: Vec<KisMarket>) -> Self {
        Self { http, markets }
    }

    pub fn from_settings(settings: &Settings, markets: Vec<KisMarket>) -> Result<Self> {
        let markets = if markets.is_empty() {
            parse_markets(std::env::var("KIS_MARKETS").ok())
        } else {
            markets
        };
        Ok(Self::new(settings.http_client()?, markets))
    }
}

#[async_trait::async_trait]
impl ListingProvider for KisMasterListing {
    fn provider_name(&self) -> &'static str {
        "kis_master"
    }

    async fn fetch_listing(&self, country: &CountryConfig) -> Result<Vec<ListingEntry>> {
        let mut out = Vec::new();
        for market in &self.markets {
            let records = fetch_and_parse_master_zip(&self.http, *market)
                .await
                .with_context(|| format!("{market:?} master fetch failed"))?;
            tracing::info!(
                country = %country.code,
                market = ?market,
                records = records.len(),
                "loaded KIS master file"
            );
            let before = out.len();
            out.extend(
                records
                    .into_iter()
                    .filter(KisMasterRecord::is_equity)
                    .map(|r| r.into_entry(*market)),
            );
            tracing::debug!(
                market = ?market,
                equities = out.len() - before,
                "filtered KIS master to equity groups"
            );
        }
        Ok(normalize_entries(out))
    }
}

/// Security group codes that are listed shares rather than funds or notes.
const EQUITY_GROUPS: [&str; 3] = ["ST", "FS", "DR"];

/// Market caps in the master tail are in units of 100 million won.
const MASTER_CAP_UNIT: f64 = 1.0e8;

#[derive(Debug, Clone)]
struct KisMasterRecord {
    code: String,
    name: String,
    /// `None` when the line has no parsable tail.
    group: Option<String>,
    market_cap: Option<f64>,
}

impl KisMasterRecord {
    fn is_equity(&self) -> bool {
        self.group
            .as_deref()
            .map_or(true, |g| EQUITY_GROUPS.contains(&g))
    }

    fn into_entry(self, market: KisMarket) -> ListingEntry {
        let mut entry = ListingEntry::new(self.code);
        entry.quote_symbol = format!("{}{}", entry.ticker, market.quote_suffix());
        entry.name = Some(self.name);
        entry.market_cap = self.market_cap;
        entry
    }
}

pub fn parse_markets(v: Option<String>) -> Vec<KisMarket> {
    let Some(v) = v else {
        return vec![KisMarket::Kospi, KisMarket::Kosdaq];
    };
    let mut out = Vec::new();
    for part in v.split(',') {
        match part.trim().to_ascii_uppercase().as_str() {
            "KOSPI" => out.push(KisMarket::Kospi),
            "KOSDAQ" => out.push(KisMarket::Kosdaq),
            "KONEX" => out.push(KisMarket::Konex),
            _ => {}
        }
    }
    if out.is_empty() {
        out.push(KisMarket::Kospi);
        out.push(KisMarket::Kosdaq);
    }
    out
}

async fn fetch_and_parse_master_zip(
    http: &reqwest::Client,
    market: KisMarket,
) -> Result<Vec<KisMasterRecord>> {
    let res = http
        .get(market.master_url())
        .send()
        .await
        .context("master zip download failed")?;
    let status = res.status();
    let bytes = res.bytes().await.context("read master zip bytes failed")?;
    if !status.is_success() {
        anyhow::bail!("master zip HTTP {status}");
    }

    let bytes_vec = bytes.to_vec();
    let records = tokio::task::spawn_blocking(move || unzip_and_parse_master(&bytes_vec, market))
        .await
        .context("join unzip task failed")??;
    Ok(records)
}

fn unzip_and_parse_master(zip_bytes: &[u8], market: KisMarket) -> Result<Vec<KisMasterRecord>> {
    use std::io::{Cursor, Read};

    let mut zip =
        zip::ZipArchive::new(Cursor::new(zip_bytes)).context("open zip archive failed")?;
    anyhow::ensure!(!zip.is_empty(), "zip has no entries");

    let mut mst_idx = 0;
    for i in 0..zip.len() {
        let f = zip.by_index(i).context("open zip entry failed")?;
        if f.name().to_ascii_lowercase().ends_with(".mst") {
            mst_idx = i;
            break;
        }
    }

    let mut file = zip.by_index(mst_idx).context("open zip entry failed")?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).context("read zip entry failed")?;

    Ok(parse_master_lines(&buf, market))
}

fn parse_master_lines(buf: &[u8], market: KisMarket) -> Vec<KisMasterRecord> {
    let mut out = Vec::new();
    for line in buf.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() < 6 {
            continue;
        }

        let code_bytes = &line[0..6];
        if !code_bytes.iter().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let code = String::from_utf8_lossy(code_bytes).into_owned();

        // Code, padding, then a fixed-width 12-byte ISIN that may touch the name.
        let mut i = 6;
        while i < line.len() && line[i].is_ascii_whitespace() {
            i += 1;
        }

        let isin_start = i;
        let name_start = if line.len() >= isin_start + 12 {
            isin_start + 12
        } else {
            while i < line.len() && !line[i].is_ascii_whitespace() {
                i += 1;
            }
            i
        };

        if name_start >= line.len() {
            continue;
        }

        let (name_end, group, market_cap) = match market.tail_len() {
            Some(t) if line.len() >= name_start + t => {
                let tail = &line[line.len() - t..];
                (line.len() - t, Some(decode_euc_kr_trim(&tail[..2])), parse_tail_cap(tail))
            }
            _ => {
                let after_name = &line[name_start..];
                match find_st_marker(after_name) {
                    Some(pos) => (name_start + pos, Some("ST".to_string()), None),
                    None => (line.len(), None, None),
                }
            }
        };

        let name = decode_euc_kr_trim(&line[name_start..name_end]);
        if name.is_empty() {
            continue;
        }

        out.push(KisMasterRecord {
            code,
            name,
            group: group.filter(|g| !g.is_empty()),
            market_cap,
        });
    }
    out
}

/// Market cap sits nine bytes wide, just before the trailing group-company
/// code and three flag bytes.
fn parse_tail_cap(tail: &[u8]) -> Option<f64> {
    let field = tail.get(tail.len().checked_sub(15)?..tail.len() - 6)?;
    let digits = std::str::from_utf8(field).ok()?.trim();
    let units = digits.parse::<u64>().ok().filter(|v| *v > 0)?;
    Some(units as f64 * MASTER_CAP_UNIT)
}

fn find_st_marker(bytes: &[u8]) -> Option<usize> {
    (0..bytes.len().saturating_sub(1)).find(|&i| {
        i > 0 && bytes[i] == b'S' && bytes[i + 1] == b'T' && bytes[i - 1].is_ascii_whitespace()
    })
}

fn decode_euc_kr_trim(bytes: &[u8]) -> String {
    let is_pad = |b: &u8| b.is_ascii_whitespace() || *b == 0;
    let start = bytes.iter().position(|b| !is_pad(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_pad(b)).map_or(start, |p| p + 1);

    let (cow, _, _) = EUC_KR.decode(&bytes[start..end]);
    cow.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail(market: KisMarket, group: &str, cap_units: u64) -> Vec<u8> {
        let t = market.tail_len().unwrap();
        let mut tail = vec![b' '; t];
        tail[..2].copy_from_slice(group.as_bytes());
        let cap = format!("{cap_units:>9}");
        tail[t - 15..t - 6].copy_from_slice(cap.as_bytes());
        tail[t - 6..t - 3].copy_from_slice(b"001");
        tail[t - 3..].copy_from_slice(b"YNN");
        tail
    }

    fn master_line(market: KisMarket, code: &str, name: &str, group: &str, cap: u64) -> Vec<u8> {
        let isin = format!("KR7{code}00");
        let mut line = format!("{code}   {isin:<12}").into_bytes();
        let (name_bytes, _, _) = EUC_KR.encode(name);
        line.extend_from_slice(&name_bytes);
        line.extend_from_slice(b"        ");
        line.extend(tail(market, group, cap));
        line.extend_from_slice(b"\r\n");
        line
    }

    #[test]
    fn parses_master_lines_with_group_and_cap() {
        let mut buf = master_line(KisMarket::Kospi, "005930", "삼성전자", "ST", 3_500_000);
        buf.extend(master_line(KisMarket::Kospi, "069500", "KODEX 200", "EF", 80_000));
        buf.extend_from_slice(b"garbage line\n");

        let parsed = parse_master_lines(&buf, KisMarket::Kospi);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].code, "005930");
        assert_eq!(parsed[0].name, "삼성전자");
        assert_eq!(parsed[0].group.as_deref(), Some("ST"));
        assert_eq!(parsed[0].market_cap, Some(3.5e14));
        assert!(parsed[0].is_equity());

        assert_eq!(parsed[1].name, "KODEX 200");
        assert!(!parsed[1].is_equity());
    }

    #[test]
    fn konex_lines_fall_back_to_group_marker() {
        let mut line = b"278990   KR7278990004".to_vec();
        let (name_bytes, _, _) = EUC_KR.encode("에이치엔에스하이텍");
        line.extend_from_slice(&name_bytes);
        line.extend_from_slice(b"                ST1002700\r\n");

        let parsed = parse_master_lines(&line, KisMarket::Konex);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "에이치엔에스하이텍");
        assert_eq!(parsed[0].group.as_deref(), Some("ST"));
        assert_eq!(parsed[0].market_cap, None);
    }

    #[test]
    fn kospi_and_kosdaq_mix_ranks_by_market_cap() {
        let mut kospi = Vec::new();
        for i in 0..5u64 {
            kospi.extend(master_line(KisMarket::Kospi, &format!("{:06}", 100 + i), "소형주", "ST", 10 + i));
        }
        kospi.extend(master_line(KisMarket::Kospi, "069500", "KODEX 200", "EF", 900_000));
        let kosdaq = master_line(KisMarket::Kosdaq, "247540", "에코프로비엠", "ST", 200_000);

        let mut entries: Vec<ListingEntry> = parse_master_lines(&kospi, KisMarket::Kospi)
            .into_iter()
            .chain(parse_master_lines(&kosdaq, KisMarket::Kosdaq))
            .filter(KisMasterRecord::is_equity)
            .map(|r| {
                let market = if r.code == "247540" { KisMarket::Kosdaq } else { KisMarket::Kospi };
                r.into_entry(market)
            })
            .collect();
        entries = crate::screen::cap_filter(entries, Some(2));

        let tickers: Vec<&str> = entries.iter().map(|e| e.quote_symbol.as_str()).collect();
        assert_eq!(tickers, vec!["247540.KQ", "000104.KS"]);
        assert_eq!(entries[0].market_cap, Some(2.0e13));
    }

    #[test]
    fn entries_carry_market_quote_suffix() {
        let rec = KisMasterRecord {
            code: "247540".to_string(),
            name: "에코프로비엠".to_string(),
            group: Some("ST".to_string()),
            market_cap: Some(2.0e13),
        };
        let entry = rec.into_entry(KisMarket::Kosdaq);
        assert_eq!(entry.ticker, "247540");
        assert_eq!(entry.quote_symbol, "247540.KQ");
        assert_eq!(entry.market_cap, Some(2.0e13));
    }

    #[test]
    fn parses_market_list_with_fallback() {
        assert_eq!(
            parse_markets(Some("kosdaq, konex".to_string())),
            vec![KisMarket::Kosdaq, KisMarket::Konex]
        );
        assert_eq!(
            parse_markets(Some("nyse".to_string())),
            vec![KisMarket::Kospi, KisMarket::Kosdaq]
        );
        assert_eq!(parse_markets(None), vec![KisMarket::Kospi, KisMarket::Kosdaq]);
    }
}

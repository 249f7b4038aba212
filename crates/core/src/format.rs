use crate::domain::stock::NOT_AVAILABLE;

const TRILLION: f64 = 1.0e12;
const BILLION: f64 = 1.0e9;
const MILLION: f64 = 1.0e6;

/// Formats a price as `<currency><grouped digits>`, e.g. `$1,234.50` or `₩71,000`.
pub fn format_price(value: f64, currency: &str, decimals: usize) -> String {
    format!("{currency}{}", group_thousands(value, decimals))
}

/// Scales a raw market cap to a `T`/`B`/`M` suffix with two decimals.
/// Values under a million are printed whole with the currency symbol.
///
/// The suffix is picked after rounding, so `999.996e9` is `1.00T`.
pub fn format_market_cap(value: Option<f64>, currency: &str) -> String {
    let Some(v) = value.filter(|v| v.is_finite() && *v > 0.0) else {
        return NOT_AVAILABLE.to_string();
    };

    const UNITS: [(f64, char); 3] = [(MILLION, 'M'), (BILLION, 'B'), (TRILLION, 'T')];

    let idx = match UNITS.iter().rposition(|(scale, _)| v >= *scale) {
        Some(i) => i,
        None if v.round() >= MILLION => 0,
        None => return format!("{currency}{}", group_thousands(v, 0)),
    };

    let (mut scale, mut suffix) = UNITS[idx];
    if round_to_cents(v / scale) >= 1000.0 {
        if let Some(&(next_scale, next_suffix)) = UNITS.get(idx + 1) {
            scale = next_scale;
            suffix = next_suffix;
        }
    }
    format!("{}{suffix}", group_thousands(v / scale, 2))
}

fn round_to_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn format_pe(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{v:.2}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Parses screener-style market caps: plain numbers, `$`/`,` decorated
/// numbers, or `T`/`B`/`M`/`K` suffixed values (`"2.5B"`).
pub fn parse_market_cap(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect::<String>()
        .to_ascii_uppercase();
    if cleaned.is_empty() || cleaned == "-" || cleaned == NOT_AVAILABLE {
        return None;
    }

    let (digits, scale) = match cleaned.chars().last()? {
        'T' => (&cleaned[..cleaned.len() - 1], TRILLION),
        'B' => (&cleaned[..cleaned.len() - 1], BILLION),
        'M' => (&cleaned[..cleaned.len() - 1], MILLION),
        'K' => (&cleaned[..cleaned.len() - 1], 1.0e3),
        _ => (cleaned.as_str(), 1.0),
    };

    let v = digits.parse::<f64>().ok()? * scale;
    v.is_finite().then_some(v)
}

/// Number with comma-separated thousands and a fixed number of decimals.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 4);
    for (i, ch) in int_part.chars().enumerate() {
        if i != 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0.0, 2), "0.00");
        assert_eq!(group_thousands(999.0, 0), "999");
        assert_eq!(group_thousands(1234.5, 2), "1,234.50");
        assert_eq!(group_thousands(1234567.891, 2), "1,234,567.89");
        assert_eq!(group_thousands(-1234.0, 0), "-1,234");
    }

    #[test]
    fn formats_prices_with_currency() {
        assert_eq!(format_price(182.456, "$", 2), "$182.46");
        assert_eq!(format_price(71000.0, "₩", 0), "₩71,000");
    }

    #[test]
    fn formats_market_cap_with_suffix() {
        assert_eq!(format_market_cap(Some(3.2e12), "$"), "3.20T");
        assert_eq!(format_market_cap(Some(2.5e9), "$"), "2.50B");
        assert_eq!(format_market_cap(Some(1234.0e9), "$"), "1.23T");
        assert_eq!(format_market_cap(Some(750.0e6), "$"), "750.00M");
        assert_eq!(format_market_cap(Some(512_000.0), "$"), "$512,000");
        assert_eq!(format_market_cap(None, "$"), "N/A");
        assert_eq!(format_market_cap(Some(0.0), "$"), "N/A");
    }

    #[test]
    fn market_cap_suffix_follows_rounding() {
        assert_eq!(format_market_cap(Some(999.996e9), "$"), "1.00T");
        assert_eq!(format_market_cap(Some(999.994e9), "$"), "999.99B");
        assert_eq!(format_market_cap(Some(999.9999e6), "$"), "1.00B");
        assert_eq!(format_market_cap(Some(999_999.6), "₩"), "1.00M");
    }

    #[test]
    fn parses_suffixed_market_caps() {
        assert_eq!(parse_market_cap("2.5B"), Some(2.5e9));
        assert_eq!(parse_market_cap("3t"), Some(3.0e12));
        assert_eq!(parse_market_cap("$1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_market_cap("3012345678900.00"), Some(3_012_345_678_900.0));
        assert_eq!(parse_market_cap(""), None);
        assert_eq!(parse_market_cap("N/A"), None);
        assert_eq!(parse_market_cap("abc"), None);
    }

    #[test]
    fn formats_pe() {
        assert_eq!(format_pe(Some(31.456)), "31.46");
        assert_eq!(format_pe(None), "N/A");
        assert_eq!(format_pe(Some(f64::NAN)), "N/A");
    }
}

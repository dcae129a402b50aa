use regex::Regex;
use std::sync::OnceLock;

/// Mock market average price in AVAX for similar events.
pub const MARKET_AVERAGE_PRICE_AVAX: f64 = 0.1;

/// Venues claiming more tickets than capacity times this factor are flagged.
pub const CAPACITY_SLACK_FACTOR: f64 = 1.2;

const TEMP_EMAIL_DOMAINS: &[&str] = &["10minutemail.com", "tempmail.org", "guerrillamail.com"];

/// Coefficient of variation (stddev / mean) of recent sale prices.
/// Returns 0.0 with fewer than two samples or a zero mean.
pub fn price_deviation(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
    variance.sqrt() / mean
}

/// True when every interval between consecutive transfers stays within 10%
/// of the mean interval. Needs at least three transfers.
pub fn uniform_timing(timestamps: &[i64]) -> bool {
    if timestamps.len() < 3 {
        return false;
    }
    let intervals: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if avg <= 0.0 {
        return false;
    }
    intervals.iter().all(|interval| (interval - avg).abs() < avg * 0.1)
}

/// Consistently gwei-rounded gas prices across more than five transfers
/// indicate scripted submission.
pub fn round_gas_prices(gas_prices: &[Option<u64>]) -> bool {
    gas_prices.len() > 5
        && gas_prices
            .iter()
            .all(|g| matches!(g, Some(p) if *p > 0 && p % 1_000_000_000 == 0))
}

/// Estimated venue capacity from location keywords.
pub fn venue_capacity(location: &str) -> u64 {
    let loc = location.to_lowercase();
    if loc.contains("stadium") {
        50_000
    } else if loc.contains("arena") {
        20_000
    } else if loc.contains("theater") {
        2_000
    } else if loc.contains("club") {
        500
    } else {
        1_000
    }
}

/// Ratio of the listed ticket price to the market average.
pub fn price_to_market_ratio(price_avax: f64) -> f64 {
    price_avax / MARKET_AVERAGE_PRICE_AVAX
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+]?[1-9][\d\s\-()]{7,15}$").unwrap())
}

/// Disposable email domains or malformed phone numbers.
pub fn suspicious_contact(email: &str, phone: &str) -> bool {
    let temp_email = TEMP_EMAIL_DOMAINS.iter().any(|domain| email.contains(domain));
    let invalid_phone = !phone.is_empty() && !phone_regex().is_match(phone);
    temp_email || invalid_phone
}

/// True when any required listing field is empty after trimming.
pub fn incomplete_information(required_fields: &[&str]) -> bool {
    !required_fields.iter().all(|field| !field.trim().is_empty())
}

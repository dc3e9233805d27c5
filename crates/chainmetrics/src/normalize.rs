//! Unit normalization.
//!
//! Pure conversions from raw number text plus a unit tag to the canonical
//! value of a metric. Every function returns `None` on malformed input
//! instead of an error: a missing value is an ordinary outcome here.
//!
//! Conversions that divide by a power of ten work on the decimal digits, so
//! `26065600000` wei becomes exactly the `f64` closest to `26.0656`, even for
//! integers above 2^53.

use serde::{Deserialize, Serialize};

/// Wei per gwei.
const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Decimal places between µSTX and STX.
const MICRO_PLACES: usize = 6;

/// Unit recognized next to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitTag {
    Gwei,
    Wei,
    Stx,
    MicroStx,
    Usd,
    Seconds,
    /// No unit next to the number.
    Bare,
}

impl UnitTag {
    /// Map a matched suffix/prefix (any case) to its tag.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_lowercase().as_str() {
            "gwei" => Some(Self::Gwei),
            "wei" => Some(Self::Wei),
            "stx" => Some(Self::Stx),
            "µstx" | "μstx" | "ustx" | "microstx" => Some(Self::MicroStx),
            "$" | "usd" => Some(Self::Usd),
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }
}

/// A canonical value plus the source reading when a conversion happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub value: f64,
    /// Reading in the source unit, e.g. `26065600000 wei`.
    pub source: Option<String>,
}

/// Convert `number` (digits, optional thousands separators and fraction)
/// tagged with `unit` into the canonical unit of its family.
pub fn normalize(number: &str, unit: UnitTag) -> Option<Normalized> {
    match unit {
        UnitTag::Wei => {
            let (wei, gwei) = wei_to_gwei(number)?;
            Some(Normalized {
                value: gwei,
                source: Some(format!("{wei} wei")),
            })
        }
        UnitTag::MicroStx => {
            let value = micro_stx_to_stx(number)?;
            Some(Normalized {
                value,
                source: Some(format!("{} µSTX", strip_separators(number))),
            })
        }
        UnitTag::Gwei | UnitTag::Stx | UnitTag::Usd | UnitTag::Seconds | UnitTag::Bare => {
            parse_decimal(number).map(|value| Normalized {
                value,
                source: None,
            })
        }
    }
}

/// Parse a decimal number, ignoring `,` thousands separators and spaces.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = strip_separators(raw);
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a wei reading (`"26,065,600,000wei"`, `"26065600000"`) to gwei.
///
/// Returns the integer wei alongside the gwei value. Only whole wei are
/// accepted.
pub fn wei_to_gwei(raw: &str) -> Option<(u128, f64)> {
    let trimmed = raw.trim();
    let without_unit = trimmed
        .strip_suffix("wei")
        .or_else(|| trimmed.strip_suffix("WEI"))
        .or_else(|| trimmed.strip_suffix("Wei"))
        .unwrap_or(trimmed);
    let cleaned = strip_separators(without_unit);
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let wei: u128 = cleaned.parse().ok()?;
    let whole = wei / WEI_PER_GWEI;
    let frac = wei % WEI_PER_GWEI;
    let gwei = format!("{whole}.{frac:09}").parse::<f64>().ok()?;
    Some((wei, gwei))
}

/// Convert a µSTX amount to STX.
pub fn micro_stx_to_stx(raw: &str) -> Option<f64> {
    let number = raw
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic() || c == 'µ' || c == 'μ');
    shift_decimal(&strip_separators(number), MICRO_PLACES)
}

/// Divide a non-negative decimal string by `10^places` without going
/// through binary floating point until the final parse.
fn shift_decimal(number: &str, places: usize) -> Option<f64> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    let valid = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !valid(int_part) || !valid(frac_part) {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let point = int_part.len() as isize - places as isize;
    let shifted = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs()), digits)
    } else {
        let (head, tail) = digits.split_at(point as usize);
        format!("{head}.{tail}")
    };
    shifted.trim_end_matches('.').parse::<f64>().ok()
}

fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

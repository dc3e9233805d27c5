//! Generic numeric extraction from free text.
//!
//! Two paths, tried in order:
//!
//! 1. **Unit-qualified**: `<number><optional space><unit>` for the metric's
//!    unit family (`1.5 Gwei`, `26,065,600,000wei`, `200,000 µSTX`, `$0.62`).
//!    When any such match exists, the first one inside the plausible range
//!    wins and out-of-range unit matches are rejected outright.
//! 2. **Bare number**: otherwise the first number in the text, accepted only
//!    when it falls inside the plausible range.
//!
//! The bare path can pick up unrelated numbers (dates, block heights) that
//! happen to be in range. That trade-off is deliberate and is not guarded
//! against here.

use crate::config::{PlausibleRange, UnitFamily};
use crate::normalize::{normalize, UnitTag};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static GWEI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(gwei|wei)\b").expect("gwei regex is valid")
});

static STX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(µstx|μstx|ustx|microstx|stx)\b")
        .expect("stx regex is valid")
});

static USD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\$)\s*(\d[\d,]*(?:\.\d+)?)|(\d[\d,]*(?:\.\d+)?)\s*(usd)\b")
        .expect("usd regex is valid")
});

static SECONDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(seconds|second|secs|sec|s)\b")
        .expect("seconds regex is valid")
});

static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("bare number regex is valid"));

static ONLY_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d[\d,]*(?:\.\d+)?\s*$").expect("standalone number regex is valid")
});

/// A number found in text, already converted to the canonical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericMatch {
    pub value: f64,
    /// The number as written, separators included.
    pub number: String,
    pub unit: UnitTag,
    /// The full matched fragment, e.g. `200,000 µSTX`.
    pub matched: String,
    /// Source-unit reading when a conversion happened.
    pub source: Option<String>,
}

/// Extract one value for `family` from `text`, gated by `range`.
pub fn extract(text: &str, family: UnitFamily, range: &PlausibleRange) -> Option<NumericMatch> {
    let qualified = unit_matches(text, family);
    if !qualified.is_empty() {
        return qualified.into_iter().find(|m| range.contains(m.value));
    }
    first_bare_number(text).filter(|m| range.contains(m.value))
}

/// Every unit-qualified number in `text`, in order of appearance.
pub fn unit_matches(text: &str, family: UnitFamily) -> Vec<NumericMatch> {
    let re: &Regex = match family {
        UnitFamily::Gwei => &GWEI_RE,
        UnitFamily::Stx => &STX_RE,
        UnitFamily::Usd => &USD_RE,
        UnitFamily::Seconds => &SECONDS_RE,
        UnitFamily::Plain => return Vec::new(),
    };
    re.captures_iter(text)
        .filter_map(|caps| from_captures(&caps, family))
        .collect()
}

/// First number in `text` regardless of unit.
pub fn first_bare_number(text: &str) -> Option<NumericMatch> {
    let m = BARE_RE.find(text)?;
    let number = m.as_str().trim_end_matches(',').to_string();
    let normalized = normalize(&number, UnitTag::Bare)?;
    Some(NumericMatch {
        value: normalized.value,
        matched: number.clone(),
        number,
        unit: UnitTag::Bare,
        source: None,
    })
}

/// Whether the whole text is a single number (`12.5`, `1,024`).
pub fn is_standalone_number(text: &str) -> bool {
    ONLY_NUMBER_RE.is_match(text)
}

/// Whether `text` mentions a unit of `family` anywhere.
pub fn mentions_unit(text: &str, family: UnitFamily) -> bool {
    let lower = text.to_lowercase();
    match family {
        UnitFamily::Gwei => lower.contains("wei"),
        UnitFamily::Stx => lower.contains("stx"),
        UnitFamily::Usd => lower.contains('$') || lower.contains("usd"),
        UnitFamily::Seconds => !unit_matches(text, family).is_empty(),
        UnitFamily::Plain => false,
    }
}

fn from_captures(caps: &Captures<'_>, family: UnitFamily) -> Option<NumericMatch> {
    let (number, symbol) = match family {
        UnitFamily::Usd => match (caps.get(1), caps.get(2)) {
            (Some(sym), Some(num)) => (num.as_str(), sym.as_str()),
            _ => (caps.get(3)?.as_str(), caps.get(4)?.as_str()),
        },
        _ => (caps.get(1)?.as_str(), caps.get(2)?.as_str()),
    };
    let number = number.trim_end_matches(',');
    let unit = UnitTag::from_symbol(symbol)?;
    let normalized = normalize(number, unit)?;
    Some(NumericMatch {
        value: normalized.value,
        number: number.to_string(),
        unit,
        matched: caps.get(0)?.as_str().trim().to_string(),
        source: normalized.source,
    })
}

//! Values produced by the extraction core.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A metric value recovered by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    /// Metric name, e.g. `avg_gas_price_gwei`.
    pub metric: String,
    /// Value in the metric's canonical unit.
    pub value: f64,
    /// Text the value was read from.
    pub raw: String,
    /// Name of the strategy that produced it.
    pub strategy: String,
    /// Reading in the source unit when a conversion happened (e.g. integer wei).
    pub source: Option<String>,
    /// Observation tag, e.g. the date of the CSV row the value came from.
    pub observed_at: Option<String>,
}

/// Outcome of a metric's strategy chain.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Found(ExtractedValue),
    /// Nothing usable was found. Absent values never carry raw text.
    Absent { reason: String },
}

impl MetricOutcome {
    pub fn absent(reason: impl Into<String>) -> Self {
        Self::Absent {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&ExtractedValue> {
        match self {
            Self::Found(v) => Some(v),
            Self::Absent { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Classifier judgment on whether automated access was denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub blocked: bool,
    /// Every signal that contributed to `blocked`, in detection order.
    pub reasons: Vec<String>,
    /// Suspicious but non-blocking signals (e.g. HTTP 5xx).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl BlockVerdict {
    /// Record a blocking signal.
    pub fn block(&mut self, reason: impl Into<String>) {
        self.blocked = true;
        self.reasons.push(reason.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Per-metric entry of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub name: String,
    pub raw_field: String,
    /// Field for the bare source-unit amount, replacing `<name>_source`.
    pub source_field: Option<String>,
    pub outcome: MetricOutcome,
}

/// Final, immutable output of one target run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResultSet {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: Vec<MetricEntry>,
    /// Present when block detection was enabled for the target.
    pub verdict: Option<BlockVerdict>,
    /// Target-level failure (navigation error, abandoned run).
    pub error: Option<String>,
}

impl MetricResultSet {
    /// Look up a metric's outcome by name.
    pub fn outcome(&self, metric: &str) -> Option<&MetricOutcome> {
        self.metrics
            .iter()
            .find(|m| m.name == metric)
            .map(|m| &m.outcome)
    }

    /// Value of a metric, if it was found.
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.outcome(metric)
            .and_then(MetricOutcome::value)
            .map(|v| v.value)
    }

    pub fn found_count(&self) -> usize {
        self.metrics.iter().filter(|m| m.outcome.is_found()).count()
    }

    /// RFC 3339 UTC timestamp with millisecond precision and a `Z` suffix.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Flat JSON record: one field per metric plus its raw field.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Map, Value};

        let mut obj = Map::new();
        obj.insert("target".into(), json!(self.target));
        obj.insert("timestamp".into(), json!(self.timestamp_string()));

        let mut missing = Map::new();
        for entry in &self.metrics {
            match &entry.outcome {
                MetricOutcome::Found(v) => {
                    obj.insert(entry.name.clone(), json!(v.value));
                    obj.insert(entry.raw_field.clone(), json!(v.raw));
                    obj.insert(format!("{}_strategy", entry.name), json!(v.strategy));
                    match (&v.source, &entry.source_field) {
                        (Some(source), Some(field)) => {
                            let amount = source.split_whitespace().next().unwrap_or(source);
                            obj.insert(field.clone(), json!(amount));
                        }
                        (Some(source), None) => {
                            obj.insert(format!("{}_source", entry.name), json!(source));
                        }
                        (None, _) => {}
                    }
                    if let Some(observed_at) = &v.observed_at {
                        obj.insert(format!("{}_observed_at", entry.name), json!(observed_at));
                    }
                }
                MetricOutcome::Absent { reason } => {
                    obj.insert(entry.name.clone(), Value::Null);
                    obj.insert(entry.raw_field.clone(), Value::Null);
                    missing.insert(entry.name.clone(), json!(reason));
                }
            }
        }
        if !missing.is_empty() {
            obj.insert("missing".into(), Value::Object(missing));
        }

        if let Some(verdict) = &self.verdict {
            obj.insert("blocked".into(), json!(verdict.blocked));
            obj.insert("reasons".into(), json!(verdict.reasons));
            if !verdict.warnings.is_empty() {
                obj.insert("warnings".into(), json!(verdict.warnings));
            }
        }
        if let Some(error) = &self.error {
            obj.insert("error".into(), json!(error));
        }
        Value::Object(obj)
    }
}

impl Serialize for MetricResultSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> MetricResultSet {
        MetricResultSet {
            target: "rootstock".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            metrics: vec![
                MetricEntry {
                    name: "avg_gas_price_gwei".into(),
                    raw_field: "avg_gas_price_raw".into(),
                    source_field: None,
                    outcome: MetricOutcome::Found(ExtractedValue {
                        metric: "avg_gas_price_gwei".into(),
                        value: 26.0656,
                        raw: "26,065,600,000wei".into(),
                        strategy: "labeled_card".into(),
                        source: Some("26065600000 wei".into()),
                        observed_at: None,
                    }),
                },
                MetricEntry {
                    name: "blocktime_seconds".into(),
                    raw_field: "blocktime_raw".into(),
                    source_field: None,
                    outcome: MetricOutcome::absent("all strategies exhausted"),
                },
            ],
            verdict: None,
            error: None,
        }
    }

    #[test]
    fn test_to_json_flattens_metrics() {
        let json = sample().to_json();
        assert_eq!(json["timestamp"], "2024-01-02T03:04:05.000Z");
        assert_eq!(json["avg_gas_price_gwei"], 26.0656);
        assert_eq!(json["avg_gas_price_raw"], "26,065,600,000wei");
        assert_eq!(json["avg_gas_price_gwei_source"], "26065600000 wei");
        assert!(json["blocktime_seconds"].is_null());
        assert!(json["blocktime_raw"].is_null());
        assert_eq!(json["missing"]["blocktime_seconds"], "all strategies exhausted");
        assert!(json.get("blocked").is_none());
    }

    #[test]
    fn test_source_field_carries_bare_amount() {
        let mut set = sample();
        set.metrics[0].source_field = Some("avg_gas_price_wei".into());
        let json = set.to_json();
        assert_eq!(json["avg_gas_price_wei"], "26065600000");
        assert!(json.get("avg_gas_price_gwei_source").is_none());
    }

    #[test]
    fn test_to_json_includes_verdict_when_present() {
        let mut set = sample();
        let mut verdict = BlockVerdict::default();
        verdict.block("rate limited (HTTP 429)");
        set.verdict = Some(verdict);
        let json = set.to_json();
        assert_eq!(json["blocked"], true);
        assert_eq!(json["reasons"][0], "rate limited (HTTP 429)");
    }

    #[test]
    fn test_lookup_helpers() {
        let set = sample();
        assert_eq!(set.value("avg_gas_price_gwei"), Some(26.0656));
        assert_eq!(set.value("blocktime_seconds"), None);
        assert_eq!(set.found_count(), 1);
    }
}

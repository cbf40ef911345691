//! Daily market bar, the unit of event-time ordering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key used for bars that arrive without a symbol.
pub const UNKNOWN_SYMBOL: &str = "unknown";

#[derive(Debug, Error)]
pub enum BarError {
    #[error("malformed bar event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("bar {symbol} @ {date}: field `{field}` is not finite ({value})")]
    NonFinite {
        symbol: String,
        date: DateTime<Utc>,
        field: &'static str,
        value: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(default)]
    pub symbol: String,
    #[serde(with = "event_time")]
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub dividends: f64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        date: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            open,
            high,
            low,
            close,
            volume,
            dividends: 0.0,
        }
    }

    pub fn with_dividends(mut self, dividends: f64) -> Self {
        self.dividends = dividends;
        self
    }

    /// Partition key on the transport; empty symbols fall back to [`UNKNOWN_SYMBOL`].
    pub fn key(&self) -> &str {
        if self.symbol.is_empty() {
            UNKNOWN_SYMBOL
        } else {
            &self.symbol
        }
    }

    /// Rejects bars carrying NaN or infinite prices/volumes.
    pub fn validate(&self) -> Result<(), BarError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("dividends", self.dividends),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(BarError::NonFinite {
                    symbol: self.key().to_string(),
                    date: self.date,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Event timestamps arrive as RFC 3339, as a naive ISO-8601 date-time (taken as UTC),
/// or as a bare date. They are always written back as RFC 3339.
mod event_time {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid event time `{}`", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

//! Response body decoding
//!
//! JSON bodies are decoded with `serde_json`, and failures are turned into a
//! [`DecodingError`] naming the failure kind, the coding path of the offending
//! value, and the parser's own description. A bare "could not be read"
//! message is never produced.
//!
//! # Dates
//!
//! Date fields opt in to the client's configured [`DateDecodingStrategy`] by
//! annotating them with the [`date`] helper:
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use serde::Deserialize;
//! use authlink::api::decode::{decode_json, DateDecodingStrategy};
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     #[serde(with = "authlink::api::decode::date")]
//!     placed_at: DateTime<Utc>,
//! }
//!
//! let order: Order = decode_json(
//!     br#"{"placed_at": 1700000000}"#,
//!     &DateDecodingStrategy::SecondsSince1970,
//! ).unwrap();
//! assert_eq!(order.placed_at.timestamp(), 1_700_000_000);
//! ```

use std::cell::RefCell;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::Value;

use crate::api::models::ApiError;
use crate::api::transport::RawResponse;
use crate::error::{AuthlinkError, DecodingError, DecodingErrorKind, Result};

/// How date fields annotated with [`date`] are read from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateDecodingStrategy {
    /// RFC 3339 / ISO 8601 strings, e.g. `2024-05-01T10:00:00Z`.
    #[default]
    Iso8601,
    /// Numeric seconds since the Unix epoch (fractions allowed).
    #[serde(rename = "seconds")]
    SecondsSince1970,
    /// Numeric milliseconds since the Unix epoch.
    #[serde(rename = "milliseconds")]
    MillisecondsSince1970,
    /// Strings in a `chrono` format, interpreted as UTC.
    Formatted(String),
}

impl DateDecodingStrategy {
    fn decode(&self, value: &Value) -> std::result::Result<DateTime<Utc>, String> {
        match (self, value) {
            (_, Value::Null) => Err("invalid type: null, expected a date".to_string()),
            (DateDecodingStrategy::Iso8601, Value::String(text)) => {
                DateTime::parse_from_rfc3339(text)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(|e| format!("invalid value: '{}' is not ISO 8601: {}", text, e))
            }
            (DateDecodingStrategy::SecondsSince1970, Value::Number(number)) => number
                .as_f64()
                .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single())
                .ok_or_else(|| format!("invalid value: {} is not a valid timestamp", number)),
            (DateDecodingStrategy::MillisecondsSince1970, Value::Number(number)) => number
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .ok_or_else(|| format!("invalid value: {} is not a valid timestamp", number)),
            (DateDecodingStrategy::Formatted(format), Value::String(text)) => {
                let naive = match NaiveDateTime::parse_from_str(text, format) {
                    Ok(naive) => Some(naive),
                    // Date-only formats
                    Err(_) => NaiveDate::parse_from_str(text, format)
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0)),
                };
                naive
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .ok_or_else(|| format!("invalid value: '{}' does not match '{}'", text, format))
            }
            (strategy, other) => Err(format!(
                "invalid type: {}, expected a date encoded as {:?}",
                json_kind(other),
                strategy
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

thread_local! {
    static DATE_STRATEGY: RefCell<DateDecodingStrategy> = RefCell::new(DateDecodingStrategy::default());
}

/// Installs a strategy for the current thread; restores the previous one on drop.
struct StrategyGuard {
    previous: DateDecodingStrategy,
}

impl StrategyGuard {
    fn install(strategy: &DateDecodingStrategy) -> Self {
        let previous = DATE_STRATEGY.with(|slot| slot.replace(strategy.clone()));
        Self { previous }
    }
}

impl Drop for StrategyGuard {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        DATE_STRATEGY.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Serde helper for `DateTime<Utc>` fields decoded with the active strategy.
///
/// Serialization always writes RFC 3339.
pub mod date {
    use super::*;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    /// Deserializes a date using the strategy of the decode in progress.
    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        DATE_STRATEGY
            .with(|slot| slot.borrow().decode(&value))
            .map_err(D::Error::custom)
    }

    /// Serializes a date as an RFC 3339 string.
    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    /// Same as the parent module, for `Option<DateTime<Utc>>` fields.
    ///
    /// Combine with `#[serde(default)]` so a missing key decodes as `None`.
    pub mod option {
        use super::*;
        use serde::de::Error as _;

        /// Deserializes an optional date; `null` yields `None`.
        pub fn deserialize<'de, D>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Value::deserialize(deserializer)? {
                Value::Null => Ok(None),
                value => DATE_STRATEGY
                    .with(|slot| slot.borrow().decode(&value))
                    .map(Some)
                    .map_err(D::Error::custom),
            }
        }

        /// Serializes an optional date as an RFC 3339 string or `null`.
        pub fn serialize<S>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(date) => serializer.serialize_str(&date.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Decodes `body` as JSON into `T`.
///
/// # Errors
///
/// Returns a [`DecodingError`] whose kind distinguishes corrupted input, a
/// missing key, a `null` where a value was required, and a type mismatch.
pub fn decode_json<T: DeserializeOwned>(
    body: &[u8],
    strategy: &DateDecodingStrategy,
) -> std::result::Result<T, DecodingError> {
    let _guard = StrategyGuard::install(strategy);

    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        let path = e.path().to_string();
        classify(e.into_inner(), path)
    })?;
    deserializer
        .end()
        .map_err(|e| classify(e, ".".to_string()))?;

    Ok(value)
}

/// Decodes `body` as the standard error shape, if it has that shape.
pub fn decode_api_error(body: &[u8]) -> Option<ApiError> {
    serde_json::from_slice(body).ok()
}

/// Maps a non-2xx response to its [`ApiError`], otherwise decodes `T`.
///
/// Non-2xx bodies that are not in the standard error shape fall through to
/// the `T` decode.
pub(crate) fn decode_response<T: DeserializeOwned>(
    response: &RawResponse,
    strategy: &DateDecodingStrategy,
) -> Result<T> {
    if !response.status.is_success() {
        if let Some(error) = decode_api_error(&response.body) {
            return Err(AuthlinkError::Api(error));
        }
    }
    decode_json(&response.body, strategy).map_err(AuthlinkError::Decoding)
}

fn classify(error: serde_json::Error, path: String) -> DecodingError {
    let description = error.to_string();
    let kind = match error.classify() {
        Category::Io | Category::Syntax | Category::Eof => DecodingErrorKind::Corrupted,
        Category::Data => {
            if let Some(key) = missing_field(&description) {
                DecodingErrorKind::KeyNotFound(key)
            } else if description.starts_with("invalid type: null") {
                DecodingErrorKind::ValueNotFound
            } else {
                DecodingErrorKind::TypeMismatch
            }
        }
    };

    DecodingError {
        kind,
        path,
        description,
    }
}

fn missing_field(description: &str) -> Option<String> {
    description
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
        .map(str::to_string)
}

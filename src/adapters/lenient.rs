//! Decode-or-default field combinators for loosely typed upstream JSON.
//!
//! Upstreams flip fields between strings and numbers, send `null` for
//! absent values, and occasionally ship one malformed record in an
//! otherwise good list. These helpers are used via
//! `#[serde(default, deserialize_with = "...")]` so a bad field degrades to
//! a default instead of failing the whole response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::app::FetchError;

/// String or number, rendered as a string. Anything else is empty.
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Like [`string`], but blank values become `None`.
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let s = string(d)?;
    Ok((!s.trim().is_empty()).then_some(s))
}

pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    })
}

pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

/// `true`, `1`, `"1"` and `"true"` are true; everything else is false.
pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

/// Decode as `T`, falling back to `T::default()` on any mismatch.
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A list whose malformed records are skipped. `None` when the field is
/// not an array at all, so callers can tell "no list" from "empty list".
pub fn opt_records<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(d)? {
        Value::Array(values) => Ok(Some(decode_records(values))),
        _ => Ok(None),
    }
}

/// Decode each value independently, dropping the ones that don't fit.
pub fn decode_records<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if records.len() < total {
        tracing::debug!(skipped = total - records.len(), "dropped malformed records");
    }
    records
}

/// Unwrap a container the response must have, or report the shape change.
pub fn required<T>(value: Option<T>, path: &str) -> Result<T, FetchError> {
    value.ok_or_else(|| FetchError::shape(format!("missing `{}` in response", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Record {
        #[serde(default, deserialize_with = "string")]
        id: String,
        #[serde(default, deserialize_with = "opt_i64")]
        hot: Option<i64>,
        #[serde(default, deserialize_with = "flag")]
        top: bool,
        #[serde(default, deserialize_with = "opt_f64")]
        percent: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    struct Envelope {
        #[serde(default, deserialize_with = "opt_records")]
        list: Option<Vec<Record>>,
        #[serde(default, deserialize_with = "or_default")]
        count: u32,
    }

    #[test]
    fn test_string_or_number() {
        let a: Record = serde_json::from_str(r#"{"id": 123456789012}"#).unwrap();
        let b: Record = serde_json::from_str(r#"{"id": "123456789012"}"#).unwrap();
        let c: Record = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(a.id, "123456789012");
        assert_eq!(a.id, b.id);
        assert_eq!(c.id, "");
    }

    #[test]
    fn test_numbers_and_flags() {
        let r: Record =
            serde_json::from_str(r#"{"hot": "4821000", "top": 1, "percent": "-2.5%"}"#).unwrap();
        assert_eq!(r.hot, Some(4_821_000));
        assert!(r.top);
        assert_eq!(r.percent, Some(-2.5));

        let r: Record = serde_json::from_str(r#"{"hot": "n/a", "top": "0"}"#).unwrap();
        assert_eq!(r.hot, None);
        assert!(!r.top);
    }

    #[test]
    fn test_records_skip_malformed_entries() {
        let e: Envelope =
            serde_json::from_str(r#"{"list": [{"id": 1}, "garbage", {"id": "2"}], "count": "x"}"#)
                .unwrap();
        let ids: Vec<_> = e.list.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(e.count, 0);
    }

    #[test]
    fn test_missing_list_is_distinct_from_empty() {
        let missing: Envelope = serde_json::from_str(r#"{"other": []}"#).unwrap();
        let empty: Envelope = serde_json::from_str(r#"{"list": []}"#).unwrap();
        assert!(missing.list.is_none());
        assert_eq!(empty.list.unwrap().len(), 0);
        assert!(matches!(
            required(missing.list, "list"),
            Err(FetchError::UpstreamShapeChanged(_))
        ));
    }
}

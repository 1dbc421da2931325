//! Decoders for the compact activity strings produced by the read queries.
//!
//! Two wire formats carry the same semantics:
//!
//! - flat: `"840686:2338,1,876937:1691,3113"`, alternating key and value tokens
//! - JSON fragments: `{"identifier":"ordi","value":3},{"identifier":"sats","value":1}`
//!   (an aggregated list of JSON objects without the enclosing brackets)
//!
//! Missing input decodes to an empty map. Malformed entries are skipped.

use serde_json::Value;
use std::collections::HashMap;

use crate::domain::errors::CodecError;
use crate::domain::models::ActivityEncoding;

/// Field names used by the JSON fragment format
pub const IDENTIFIER_FIELD: &str = "identifier";
pub const COUNT_FIELD: &str = "value";
pub const TXID_FIELD: &str = "txid";

/// Decode a flat `k1,v1,k2,v2` string into an `identifier -> count` map.
///
/// A pair whose value is not an unsigned integer is dropped, as is a trailing
/// key without value.
pub fn decode_key_value(compact: Option<&str>) -> HashMap<String, u64> {
    flat_pairs(compact)
        .filter_map(|(key, value)| value.parse::<u64>().ok().map(|count| (key.to_string(), count)))
        .collect()
}

/// Decode a flat `k1,v1,k1,v2` string into `identifier -> [values]`, keeping the
/// order in which values appear.
pub fn decode_key_to_list(compact: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in flat_pairs(compact) {
        if value.is_empty() {
            continue;
        }
        map.entry(key.to_string()).or_default().push(value.to_string());
    }
    map
}

/// Decode comma-joined JSON objects into `key_field -> value_field` counts.
///
/// Objects lacking a string key or an unsigned integer value are skipped; only
/// input that is not a JSON object list at all yields an error.
pub fn decode_json_key_value(
    compact: Option<&str>,
    key_field: &str,
    value_field: &str,
) -> Result<HashMap<String, u64>, CodecError> {
    let mut map = HashMap::new();
    for item in json_fragments(compact)? {
        let Some(key) = item.get(key_field).and_then(Value::as_str) else {
            continue;
        };
        let count = match item.get(value_field) {
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(text)) => text.parse::<u64>().ok(),
            _ => None,
        };
        if let Some(count) = count {
            map.insert(key.to_string(), count);
        }
    }
    Ok(map)
}

/// Decode comma-joined JSON objects into `key_field -> [value_field]`.
pub fn decode_json_key_to_list(
    compact: Option<&str>,
    key_field: &str,
    value_field: &str,
) -> Result<HashMap<String, Vec<String>>, CodecError> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for item in json_fragments(compact)? {
        let Some(key) = item.get(key_field).and_then(Value::as_str) else {
            continue;
        };
        let value = match item.get(value_field) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => continue,
        };
        map.entry(key.to_string()).or_default().push(value);
    }
    Ok(map)
}

/// Decode mint activity stored with the given encoding
pub fn decode_activity(
    encoding: ActivityEncoding,
    compact: Option<&str>,
) -> Result<HashMap<String, u64>, CodecError> {
    match encoding {
        ActivityEncoding::Flat => Ok(decode_key_value(compact)),
        ActivityEncoding::JsonFragments => {
            decode_json_key_value(compact, IDENTIFIER_FIELD, COUNT_FIELD)
        }
    }
}

/// Decode etch/deploy attempts stored with the given encoding
pub fn decode_attempts(
    encoding: ActivityEncoding,
    compact: Option<&str>,
) -> Result<HashMap<String, Vec<String>>, CodecError> {
    match encoding {
        ActivityEncoding::Flat => Ok(decode_key_to_list(compact)),
        ActivityEncoding::JsonFragments => {
            decode_json_key_to_list(compact, IDENTIFIER_FIELD, TXID_FIELD)
        }
    }
}

fn flat_pairs(compact: Option<&str>) -> impl Iterator<Item = (&str, &str)> {
    let tokens: Vec<&str> = compact
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(|data| data.split(',').map(str::trim).collect())
        .unwrap_or_default();

    tokens
        .chunks_exact(2)
        .filter(|pair| !pair[0].is_empty())
        .map(|pair| (pair[0], pair[1]))
        .collect::<Vec<_>>()
        .into_iter()
}

fn json_fragments(compact: Option<&str>) -> Result<Vec<Value>, CodecError> {
    match compact.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(data) => Ok(serde_json::from_str::<Vec<Value>>(&format!("[{}]", data))?),
    }
}

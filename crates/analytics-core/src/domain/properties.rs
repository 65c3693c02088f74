//! Dynamic, user-defined event properties and the predicate language used to
//! filter on them in funnel steps and metrics queries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

/// A JSON-like value for a single event property. Mirrors `serde_json::Value`
/// but with an ordered map so property sets serialize deterministically
/// (needed for fingerprinting and cache-key stability).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
}

pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl From<JsonValue> for PropertyValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => PropertyValue::Null,
            JsonValue::Bool(b) => PropertyValue::Bool(b),
            JsonValue::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => PropertyValue::String(s),
            JsonValue::Array(items) => PropertyValue::Array(items.into_iter().map(Into::into).collect()),
            JsonValue::Object(map) => {
                PropertyValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<PropertyValue> for JsonValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => JsonValue::Null,
            PropertyValue::Bool(b) => JsonValue::Bool(b),
            PropertyValue::Number(n) => serde_json::Number::from_f64(n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            PropertyValue::String(s) => JsonValue::String(s),
            PropertyValue::Array(items) => JsonValue::Array(items.into_iter().map(Into::into).collect()),
            PropertyValue::Object(map) => {
                JsonValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Look up a dotted path (`"address.city"`) inside a property map.
pub fn lookup_path<'a>(properties: &'a PropertyMap, path: &str) -> Option<&'a PropertyValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = properties.get(first)?;
    for segment in segments {
        match current {
            PropertyValue::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Predicate tree evaluated against an event's properties. Used by funnel
/// step filters and metrics/event-summary queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PropertyFilter {
    Eq { path: String, value: PropertyValue },
    Regex { path: String, pattern: String },
    Range { path: String, lo: Option<f64>, hi: Option<f64> },
    And(Vec<PropertyFilter>),
    Or(Vec<PropertyFilter>),
}

/// Compiled-pattern cache for `PropertyFilter::Regex`: a funnel step or
/// metrics filter is evaluated once per matching event, so recompiling the
/// same pattern on every call would mean re-parsing it per event, per scan.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn compiled_regex(pattern: &str) -> Option<Regex> {
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(re) = cache.get(pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(pattern).ok()?;
    cache.insert(pattern.to_string(), re.clone());
    Some(re)
}

impl PropertyFilter {
    pub fn matches(&self, properties: &PropertyMap) -> bool {
        match self {
            PropertyFilter::Eq { path, value } => {
                lookup_path(properties, path).map(|v| v == value).unwrap_or(false)
            }
            PropertyFilter::Regex { path, pattern } => {
                let Some(PropertyValue::String(s)) = lookup_path(properties, path) else {
                    return false;
                };
                compiled_regex(pattern).map(|re| re.is_match(s)).unwrap_or(false)
            }
            PropertyFilter::Range { path, lo, hi } => {
                let Some(PropertyValue::Number(n)) = lookup_path(properties, path) else {
                    return false;
                };
                lo.map(|lo| *n >= lo).unwrap_or(true) && hi.map(|hi| *n <= hi).unwrap_or(true)
            }
            PropertyFilter::And(filters) => filters.iter().all(|f| f.matches(properties)),
            PropertyFilter::Or(filters) => filters.iter().any(|f| f.matches(properties)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn eq_matches_exact_value() {
        let p = props(&[("plan", PropertyValue::String("pro".to_string()))]);
        let filter = PropertyFilter::Eq {
            path: "plan".to_string(),
            value: PropertyValue::String("pro".to_string()),
        };
        assert!(filter.matches(&p));
    }

    #[test]
    fn range_respects_bounds() {
        let p = props(&[("age", PropertyValue::Number(42.0))]);
        let filter = PropertyFilter::Range {
            path: "age".to_string(),
            lo: Some(18.0),
            hi: Some(65.0),
        };
        assert!(filter.matches(&p));

        let out_of_range = PropertyFilter::Range {
            path: "age".to_string(),
            lo: Some(43.0),
            hi: None,
        };
        assert!(!out_of_range.matches(&p));
    }

    #[test]
    fn nested_path_lookup() {
        let mut inner = BTreeMap::new();
        inner.insert("city".to_string(), PropertyValue::String("nyc".to_string()));
        let p = props(&[("address", PropertyValue::Object(inner))]);
        assert_eq!(
            lookup_path(&p, "address.city"),
            Some(&PropertyValue::String("nyc".to_string()))
        );
    }

    #[test]
    fn and_or_compose() {
        let p = props(&[
            ("plan", PropertyValue::String("pro".to_string())),
            ("age", PropertyValue::Number(30.0)),
        ]);
        let filter = PropertyFilter::And(vec![
            PropertyFilter::Eq {
                path: "plan".to_string(),
                value: PropertyValue::String("pro".to_string()),
            },
            PropertyFilter::Range {
                path: "age".to_string(),
                lo: Some(18.0),
                hi: None,
            },
        ]);
        assert!(filter.matches(&p));

        let never = PropertyFilter::Or(vec![PropertyFilter::Eq {
            path: "plan".to_string(),
            value: PropertyValue::String("free".to_string()),
        }]);
        assert!(!never.matches(&p));
    }
}

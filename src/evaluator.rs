//! Condition evaluation against inbound request facets.

use crate::expr;
use crate::model::{Condition, ConditionOperator, ConditionSource};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// The request data conditions and templates can see.
#[derive(Debug, Clone, Default)]
pub struct RequestFacets {
    /// Upper-cased HTTP verb.
    pub method: String,
    /// Request path (leading slash).
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Headers with lower-cased names.
    pub headers: HashMap<String, String>,
    /// Request body parsed as JSON, when it is JSON.
    pub body: Option<Value>,
    /// Route parameters; empty for mock-dispatched requests, which are
    /// matched by exact path.
    pub params: HashMap<String, String>,
    /// Raw body text, exposed to templates.
    pub raw_body: Option<String>,
}

impl RequestFacets {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Top-level body field, with JSON null treated as absent.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body
            .as_ref()
            .and_then(|b| b.get(key))
            .filter(|v| !v.is_null())
    }
}

/// String form used for operator comparisons: strings compare by content,
/// everything else by its JSON serialization.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate one condition. Expression faults log and count as false.
pub fn evaluate(condition: &Condition, facets: &RequestFacets) -> bool {
    if condition.source == ConditionSource::Script {
        let source = stringify(&condition.value);
        return match expr::eval_predicate(&source, facets) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, expression = %source, "condition expression failed");
                false
            }
        };
    }

    let actual: Option<String> = match condition.source {
        ConditionSource::Query => facets.query.get(&condition.key).cloned(),
        ConditionSource::Header => facets.header(&condition.key).map(str::to_string),
        ConditionSource::Body => facets.body_field(&condition.key).map(stringify),
        ConditionSource::Param => facets.params.get(&condition.key).cloned(),
        ConditionSource::Script => unreachable!("handled above"),
    };
    let expected = stringify(&condition.value);

    match condition.operator {
        ConditionOperator::Equals => actual.as_deref() == Some(expected.as_str()),
        ConditionOperator::NotEquals => actual.as_deref() != Some(expected.as_str()),
        ConditionOperator::Contains => actual.unwrap_or_default().contains(&expected),
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::NotExists => actual.is_none(),
        ConditionOperator::Regex => match Regex::new(&expected) {
            Ok(re) => re.is_match(actual.as_deref().unwrap_or("")),
            Err(_) => false,
        },
        ConditionOperator::Unknown => false,
    }
}

/// Parse a query string into decoded key-value pairs.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(url_decode(key), url_decode(value));
        } else {
            params.insert(url_decode(part), String::new());
        }
    }

    params
}

fn url_decode(s: &str) -> String {
    // Percent escapes carry raw bytes; a multi-byte UTF-8 character spans
    // several of them, so decode into bytes first and re-validate at the end.
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    bytes.push(byte);
                    continue;
                }
            }
            bytes.push(b'%');
            bytes.extend_from_slice(hex.as_bytes());
        } else if ch == '+' {
            bytes.push(b' ');
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

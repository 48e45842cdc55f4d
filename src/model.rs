//! Data model for dynamic mocks. The seeded business entities live in
//! `entities`.
//!
//! Wire names follow the management API (snake_case throughout).

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Current timestamp in the format used across the API.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A registered synthetic endpoint served by the dispatch interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDefinition {
    /// Sequential identifier (`mock-0001` style), immutable after creation.
    pub id: String,

    /// Human label.
    pub name: String,

    /// HTTP verb, stored upper case.
    pub method: String,

    /// Route string, stored with a leading slash.
    pub path: String,

    /// Inactive mocks are invisible to the dispatch interceptor.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Default HTTP status.
    #[serde(default = "default_status")]
    pub status_code: u16,

    /// Default response payload, or a template marker (see `template`).
    #[serde(default = "default_body")]
    pub response_body: Value,

    /// Headers merged onto every response.
    #[serde(default = "default_headers")]
    pub headers: HashMap<String, String>,

    /// Ordered rules; the first fully-satisfied rule wins.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Artificial delay in milliseconds applied before any matching.
    #[serde(default)]
    pub latency: u64,

    /// Probability (0-100) of short-circuiting to a simulated 500.
    #[serde(default)]
    pub fail_rate: u8,

    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

pub fn default_true() -> bool {
    true
}

pub fn default_status() -> u16 {
    200
}

pub fn default_body() -> Value {
    Value::Object(serde_json::Map::new())
}

pub fn default_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

/// A named, ordered condition set with a partial response override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Label used in logs when the rule triggers.
    pub name: String,

    /// ALL conditions must hold; an empty set always matches.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Override applied when the rule matches.
    #[serde(default)]
    pub response: Option<RuleResponse>,
}

/// Partial response override carried by a rule.
///
/// `body` and `status_code` replace the mock defaults outright; `headers`
/// are shallow-merged onto them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// A single predicate over one request facet, or an expression predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub source: ConditionSource,

    /// Field name to read; ignored when `source` is `script`.
    #[serde(default)]
    pub key: String,

    /// Ignored when `source` is `script`.
    #[serde(default)]
    pub operator: ConditionOperator,

    /// Comparison literal, or the predicate expression for `script`.
    #[serde(default)]
    pub value: Value,
}

/// Which part of the inbound request a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSource {
    Query,
    Header,
    Body,
    Param,
    Script,
}

/// Comparison operator. Unrecognized operators never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    Contains,
    Exists,
    NotExists,
    Regex,
    #[serde(other)]
    Unknown,
}

/// Creation payload for `POST /v1/dynamic-mocks`.
///
/// `name`, `method` and `path` are required but kept optional here so the
/// registry can report a uniform validation error instead of a serde one.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MockSpec {
    pub name: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
    pub rules: Option<Vec<Rule>>,
    pub latency: Option<u64>,
    pub fail_rate: Option<u8>,
}

/// Partial update payload for `PUT /v1/dynamic-mocks/:id`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MockPatch {
    pub name: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
    pub active: Option<bool>,
    pub rules: Option<Vec<Rule>>,
    pub latency: Option<u64>,
    pub fail_rate: Option<u8>,
}

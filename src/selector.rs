//! Rule selection: first fully-satisfied rule wins, defaults otherwise.

use crate::evaluator::{self, RequestFacets};
use crate::model::MockDefinition;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// The response chosen for a request, before template synthesis.
#[derive(Debug, Clone)]
pub struct Selection {
    pub body: Value,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    /// Name of the rule that matched, for logging.
    pub rule: Option<String>,
}

/// Walk the mock's rules in declaration order and apply the first one whose
/// conditions all hold. Later rules are never consulted. No match, or an
/// empty rule list, leaves the mock defaults untouched.
pub fn select(mock: &MockDefinition, facets: &RequestFacets) -> Selection {
    let mut selection = Selection {
        body: mock.response_body.clone(),
        status_code: mock.status_code,
        headers: mock.headers.clone(),
        rule: None,
    };

    for rule in &mock.rules {
        let matched = rule
            .conditions
            .iter()
            .all(|cond| evaluator::evaluate(cond, facets));
        if !matched {
            continue;
        }

        info!(
            mock = %mock.id,
            rule = %rule.name,
            method = %facets.method,
            path = %facets.path,
            "rule triggered"
        );

        if let Some(response) = &rule.response {
            if let Some(body) = &response.body {
                selection.body = body.clone();
            }
            if let Some(status_code) = response.status_code {
                selection.status_code = status_code;
            }
            if let Some(headers) = &response.headers {
                // Shallow merge onto the mock defaults.
                selection.headers.extend(headers.clone());
            }
        }
        selection.rule = Some(rule.name.clone());
        break;
    }

    selection
}

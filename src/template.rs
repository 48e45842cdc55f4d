//! Response synthesis: template-marked bodies rendered with Handlebars.
//!
//! A body is programmable when it is a string starting with `// template`,
//! or an object carrying a `__template` string field. Anything else is
//! served verbatim. Render faults are recovered into a diagnostic payload;
//! the selected status code and headers still ship.

use crate::evaluator::RequestFacets;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::error;

/// String-body marker for programmable responses.
pub const TEMPLATE_PREFIX: &str = "// template";

/// Object-body field carrying a programmable response.
pub const TEMPLATE_FIELD: &str = "__template";

/// Template engine for rendering dynamic response bodies.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Request data visible inside templates.
#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    method: &'a str,
    request_path: &'a str,
    /// Route parameters (empty for mock-dispatched requests).
    path: &'a HashMap<String, String>,
    query: &'a HashMap<String, String>,
    headers: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<&'a Value>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Responses are JSON, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Extract the template source if the body carries a marker.
    fn template_source(body: &Value) -> Option<&str> {
        match body {
            Value::String(s) => {
                let trimmed = s.trim_start();
                trimmed
                    .starts_with(TEMPLATE_PREFIX)
                    .then(|| trimmed[TEMPLATE_PREFIX.len()..].trim())
            }
            Value::Object(map) => map.get(TEMPLATE_FIELD).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Produce the final response body for a selection.
    ///
    /// Plain bodies pass through untouched. Template-marked bodies are
    /// rendered against the request; the rendered text is parsed as JSON
    /// when possible, otherwise served as a JSON string. A render fault is
    /// replaced with a diagnostic payload.
    pub fn synthesize(&self, body: &Value, facets: &RequestFacets) -> Value {
        let Some(source) = Self::template_source(body) else {
            return body.clone();
        };

        match self.render(source, facets) {
            Ok(rendered) => {
                serde_json::from_str(&rendered).unwrap_or(Value::String(rendered))
            }
            Err(err) => {
                error!(error = %err, "response template failed");
                json!({
                    "error": "Response template error",
                    "details": err.to_string(),
                })
            }
        }
    }

    /// Render a template string with the request as context.
    pub fn render(
        &self,
        template: &str,
        facets: &RequestFacets,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext {
            method: &facets.method,
            request_path: &facets.path,
            path: &facets.params,
            query: &facets.query,
            headers: &facets.headers,
            body: facets.raw_body.as_deref(),
            json: facets.body.as_ref(),
        };
        self.handlebars.render_template(template, &ctx)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Custom Handlebars helpers

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let uuid = format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffffffffffff,
    );
    out.write(&uuid)?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use chrono::Utc;

    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);

    let mut rng = rand::thread_rng();
    let value = rng.gen_range(min..=max.max(min));
    out.write(&value.to_string())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(v) if !v.is_null() => {
            if let Some(s) = v.as_str() {
                if !s.is_empty() {
                    out.write(s)?;
                    return Ok(());
                }
            } else {
                out.write(&v.to_string())?;
                return Ok(());
            }
        }
        _ => {}
    }

    out.write(default)?;
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facets() -> RequestFacets {
        let mut f = RequestFacets {
            method: "POST".into(),
            path: "/v1/orders".into(),
            ..RequestFacets::default()
        };
        f.query.insert("plan".into(), "gold".into());
        f.headers.insert("user-agent".into(), "test-client".into());
        f.body = Some(json!({"name": "John", "amount": 5000}));
        f.raw_body = Some(r#"{"name":"John","amount":5000}"#.into());
        f
    }

    #[test]
    fn plain_bodies_pass_through() {
        let engine = TemplateEngine::new();
        let body = json!({"ok": true, "items": [1, 2, 3]});
        assert_eq!(engine.synthesize(&body, &facets()), body);

        // Strings without the marker are not templates.
        let body = json!("just a string with {{query.plan}}");
        assert_eq!(engine.synthesize(&body, &facets()), body);
    }

    #[test]
    fn prefixed_string_renders_to_json() {
        let engine = TemplateEngine::new();
        let body = json!("// template {\"plan\": \"{{query.plan}}\", \"by\": \"{{json.name}}\"}");
        let result = engine.synthesize(&body, &facets());
        assert_eq!(result, json!({"plan": "gold", "by": "John"}));
    }

    #[test]
    fn object_field_marker_renders() {
        let engine = TemplateEngine::new();
        let body = json!({"__template": "{\"amount\": {{json.amount}}}"});
        let result = engine.synthesize(&body, &facets());
        assert_eq!(result, json!({"amount": 5000}));
    }

    #[test]
    fn non_json_render_output_becomes_a_string() {
        let engine = TemplateEngine::new();
        let body = json!("// template hello {{upper query.plan}}");
        let result = engine.synthesize(&body, &facets());
        assert_eq!(result, json!("hello GOLD"));
    }

    #[test]
    fn render_fault_yields_diagnostic_payload() {
        let engine = TemplateEngine::new();
        let body = json!("// template {{#unknown_block}}{{/unknown_block}}");
        let result = engine.synthesize(&body, &facets());
        assert_eq!(result["error"], "Response template error");
        assert!(result["details"].is_string());
    }

    #[test]
    fn header_and_method_context() {
        let engine = TemplateEngine::new();
        let result = engine
            .render("{{method}} from {{headers.user-agent}}", &facets())
            .unwrap();
        assert_eq!(result, "POST from test-client");
    }

    #[test]
    fn uuid_helper_shape() {
        let engine = TemplateEngine::new();
        let uuid = engine.render("{{uuid}}", &facets()).unwrap();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.chars().nth(8), Some('-'));
        assert_eq!(uuid.chars().nth(14), Some('4'));
    }

    #[test]
    fn default_helper_falls_back() {
        let engine = TemplateEngine::new();
        let result = engine
            .render("{{default query.missing \"fallback\"}}", &facets())
            .unwrap();
        assert_eq!(result, "fallback");

        let result = engine
            .render("{{default query.plan \"fallback\"}}", &facets())
            .unwrap();
        assert_eq!(result, "gold");
    }
}

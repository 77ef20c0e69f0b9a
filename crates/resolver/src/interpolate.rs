//! Recursive `{{ ... }}` placeholder resolution over query option trees.
//!
//! Two placeholder flavors exist:
//!
//! - A string that is exactly one placeholder resolves to the referenced
//!   value with its type intact (`"{{1+1}}"` becomes the number `2`).
//! - Placeholders embedded in surrounding text resolve left-to-right, each
//!   splicing its stringified value into the string.
//!
//! Expressions that reference `globals.environmentVariables.server` are
//! evaluated against the organization's decrypted server variables; every
//! other placeholder is looked up verbatim in the caller-supplied runtime
//! options. Resolution is a pure transform: the input tree is never mutated,
//! so one options object can back concurrent executions safely.

use crate::expr;
use crate::secrets::SecretResolver;
use lowdeck_common::models::RuntimeOptions;
use lowdeck_error::{ErrorCode, ErrorContext, LowdeckError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("Placeholder regex pattern is valid"));

/// Namespace used for expressions that reference no server variables.
static EMPTY_NAMESPACE: Lazy<Value> = Lazy::new(|| json!({}));

/// Root path exposing server variables inside expressions.
pub const SERVER_VARIABLE_NAMESPACE: &str = "globals.environmentVariables.server";

pub struct Interpolator {
    secrets: SecretResolver,
}

impl Interpolator {
    pub fn new(secrets: SecretResolver) -> Self {
        Self { secrets }
    }

    /// Resolve every placeholder in `options`, returning a new tree.
    ///
    /// Server variables are fetched at most once per call and shared by all
    /// expressions in the tree, so repeated references are deterministic
    /// within one execution while rotation is still observed across
    /// executions.
    pub async fn interpolate(
        &self,
        options: &Value,
        runtime_options: &RuntimeOptions,
        organization_id: &str,
    ) -> Result<Value> {
        let namespace = if references_server_variables(options) {
            debug!(organization_id, "Query options reference server variables");
            let variables = self
                .secrets
                .resolve_server_variables(organization_id)
                .await?;
            Some(json!({
                "globals": { "environmentVariables": { "server": variables } }
            }))
        } else {
            None
        };

        resolve_node(options, runtime_options, namespace.as_ref())
    }
}

/// Pre-scan for the server namespace so secrets are only fetched when needed.
fn references_server_variables(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.values().any(references_server_variables),
        Value::Array(items) => items.iter().any(references_server_variables),
        Value::String(s) => s.contains(SERVER_VARIABLE_NAMESPACE),
        _ => false,
    }
}

fn resolve_node(
    node: &Value,
    runtime_options: &RuntimeOptions,
    namespace: Option<&Value>,
) -> Result<Value> {
    match node {
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_node(value, runtime_options, namespace)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_node(item, runtime_options, namespace)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::String(s) => resolve_string(s, runtime_options, namespace),
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    raw: &str,
    runtime_options: &RuntimeOptions,
    namespace: Option<&Value>,
) -> Result<Value> {
    // Newlines inside the string would break placeholder matching, so they
    // collapse to spaces before anything else.
    let flattened = raw.replace('\n', " ");
    let trimmed = flattened.trim();

    let whole_placeholder = trimmed.starts_with("{{")
        && trimmed.ends_with("}}")
        && flattened.matches("{{").count() == 1;

    if whole_placeholder {
        if trimmed.contains(SERVER_VARIABLE_NAMESPACE) {
            let expression = &trimmed[2..trimmed.len() - 2];
            return evaluate_server_expression(expression, namespace);
        }
        // Runtime lookup keeps the value's type. On a miss, self-contained
        // expressions (`{{1+1}}`) still evaluate; anything else resolves to
        // null rather than failing, matching what app builders observe when
        // a widget has no state yet.
        if let Some(value) = runtime_options.get(trimmed) {
            return Ok(value.clone());
        }
        let expression = &trimmed[2..trimmed.len() - 2];
        return Ok(soft_evaluate(expression, namespace).unwrap_or(Value::Null));
    }

    let placeholders: Vec<String> = PLACEHOLDER_REGEX
        .find_iter(&flattened)
        .map(|m| m.as_str().to_string())
        .collect();
    if placeholders.is_empty() {
        return Ok(Value::String(flattened));
    }

    let mut result = flattened.clone();
    for placeholder in &placeholders {
        let replacement = if placeholder.contains(SERVER_VARIABLE_NAMESPACE) {
            let expression = &placeholder[2..placeholder.len() - 2];
            let value = evaluate_server_expression(expression, namespace)?;
            stringify(&value)
        } else {
            match runtime_options.get(placeholder.as_str()) {
                Some(value) => stringify(value),
                None => {
                    let expression = &placeholder[2..placeholder.len() - 2];
                    soft_evaluate(expression, namespace)
                        .map(|value| stringify(&value))
                        .unwrap_or_default()
                }
            }
        };
        result = result.replacen(placeholder.as_str(), &replacement, 1);
    }
    Ok(Value::String(result))
}

/// Best-effort evaluation for placeholders outside the server namespace.
///
/// Free identifiers (widget state the client never supplied) are a soft
/// miss, not an error.
fn soft_evaluate(expression: &str, namespace: Option<&Value>) -> Option<Value> {
    expr::evaluate(expression, namespace.unwrap_or(&EMPTY_NAMESPACE)).ok()
}

fn evaluate_server_expression(expression: &str, namespace: Option<&Value>) -> Result<Value> {
    let namespace = namespace.ok_or_else(|| {
        LowdeckError::new(
            ErrorCode::UnknownReference,
            "Server variables are not in scope",
        )
        .with_context(ErrorContext::Expression {
            expression: expression.to_string(),
        })
    })?;
    expr::evaluate(expression, namespace)
}

/// Render a resolved value for splicing into surrounding text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

use serde_json::Value;
use tracing::debug;

use crate::engine::context::{ExecutionContext, PARAM_NS};

/// Substitute every `${name}` / `${name.path.to.field}` placeholder in a
/// string against the context.
///
/// Resolution is total: a placeholder whose root or any path segment cannot
/// be resolved is left as its original literal text, so unresolved
/// variables stay visible in output instead of vanishing as empty strings.
/// Resolved objects and arrays interpolate as JSON; scalars stringify bare.
pub fn resolve_template(input: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the literal tail.
            out.push_str(&rest[start..]);
            return out;
        };
        let token = &after[..end];
        match lookup(token, ctx) {
            Some(value) => out.push_str(&render(&value)),
            None => {
                debug!(placeholder = token, "unresolved placeholder left in place");
                out.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Resolve placeholders inside an arbitrary literal value.
///
/// A string that is exactly one placeholder resolves to the underlying
/// typed value (so `${rows}` can feed a foreach block a real array); other
/// strings interpolate textually. Arrays and objects resolve recursively.
pub fn resolve_value(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => {
            if let Some(token) = whole_placeholder(s) {
                if let Some(resolved) = lookup(token, ctx) {
                    return resolved;
                }
                return Value::String(s.clone());
            }
            Value::String(resolve_template(s, ctx))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a placeholder token (`name` or `name.path`) to its value.
///
/// Root precedence: namespaced procedure parameter, then the active data
/// row, then the plain variable map. A name containing dots is first tried
/// whole (data rows may use dotted keys), then split into root + path.
pub fn lookup(token: &str, ctx: &ExecutionContext) -> Option<Value> {
    if let Some(value) = lookup_root(token, ctx) {
        return Some(value.clone());
    }
    let (root, path) = token.split_once('.')?;
    let mut current = lookup_root(root, ctx)?;
    for segment in path.split('.') {
        current = walk_segment(current, segment)?;
    }
    Some(current.clone())
}

fn lookup_root<'a>(name: &str, ctx: &'a ExecutionContext) -> Option<&'a Value> {
    if let Some(value) = ctx.variables.get(&format!("{PARAM_NS}{name}")) {
        return Some(value);
    }
    if let Some(dataset) = &ctx.dataset {
        if let Some(value) = dataset.values.get(name) {
            return Some(value);
        }
    }
    ctx.variables.get(name)
}

fn walk_segment<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// If the whole string is a single `${...}` placeholder, its token.
fn whole_placeholder(s: &str) -> Option<&str> {
    let token = s.strip_prefix("${")?.strip_suffix('}')?;
    if token.contains("${") || token.contains('}') {
        return None;
    }
    Some(token)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

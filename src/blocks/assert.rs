use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::handler::{BlockHandler, ParamShape, ResolvedParams, StepOutcome};
use crate::engine::registry::BlockRegistry;
use crate::engine::result::EngineError;
use crate::model::step::Step;

pub(super) fn register(registry: &mut BlockRegistry) {
    registry.register(Box::new(AssertEquals));
    registry.register(Box::new(AssertContains));
}

/// Loose equality for authored comparisons: direct value equality first,
/// then scalar-vs-stringified comparison so `200 == "200"` holds (field
/// inputs arrive as strings from the editor).
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => render(a) == render(b),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct AssertEquals;

impl BlockHandler for AssertEquals {
    fn name(&self) -> &str {
        "assert_equals"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["actual", "expected", "message"],
            value_inputs: &["actual", "expected"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let actual = params.get("actual").cloned().unwrap_or(Value::Null);
        let expected = params.get("expected").cloned().unwrap_or(Value::Null);
        if values_equal(&actual, &expected) {
            return Ok(StepOutcome::Value(Value::Null));
        }
        let prefix = params
            .get("message")
            .and_then(Value::as_str)
            .map(|m| format!("{m}: "))
            .unwrap_or_default();
        Err(EngineError::assertion(format!(
            "{prefix}expected {expected}, got {actual}"
        )))
    }
}

/// Containment assertion: substring for strings, element membership for
/// arrays, key presence for objects.
struct AssertContains;

impl BlockHandler for AssertContains {
    fn name(&self) -> &str {
        "assert_contains"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["value", "expected", "message"],
            value_inputs: &["value", "expected"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        let expected = params.get("expected").cloned().unwrap_or(Value::Null);
        let contained = match &value {
            Value::String(s) => s.contains(&render(&expected)),
            Value::Array(items) => items.iter().any(|item| values_equal(item, &expected)),
            Value::Object(map) => map.contains_key(&render(&expected)),
            other => render(other).contains(&render(&expected)),
        };
        if contained {
            return Ok(StepOutcome::Value(Value::Null));
        }
        let prefix = params
            .get("message")
            .and_then(Value::as_str)
            .map(|m| format!("{m}: "))
            .unwrap_or_default();
        Err(EngineError::assertion(format!(
            "{prefix}expected {value} to contain {expected}"
        )))
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::result::EngineError;
use crate::model::step::Step;

/// Resolved step parameters: literals with placeholders substituted, nested
/// value blocks already executed to their values.
pub type ResolvedParams = BTreeMap<String, Value>;

/// The declared input shape of a block type: plain field inputs, sockets
/// holding value-producing blocks, and sockets holding statement chains.
/// The extractor uses `statement_inputs` to tell children from nested
/// value params.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamShape {
    pub fields: &'static [&'static str],
    pub value_inputs: &'static [&'static str],
    pub statement_inputs: &'static [&'static str],
}

/// Handler for one step type. Handlers receive resolved parameters and the
/// execution context, and produce either a plain value or a control
/// sentinel the interpreter acts on.
pub trait BlockHandler {
    /// The step type name this handler is registered under.
    fn name(&self) -> &str;

    fn shape(&self) -> ParamShape;

    /// Whether executing this block requires a driver session. The
    /// interpreter creates the session lazily at the first such step.
    fn driver_dependent(&self) -> bool {
        false
    }

    /// Execute the block.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for assertion mismatches, bad parameters, or
    /// driver failures. Control-flow requests are not errors; they are
    /// [`StepOutcome`] sentinels.
    fn execute(
        &self,
        step: &Step,
        params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError>;
}

/// What a block asks the interpreter to do next: an ordinary value, or a
/// tagged control request the interpreter dispatches on explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A plain result value (`Value::Null` for statements with no output).
    Value(Value),
    /// Invoke a named procedure with resolved arguments.
    ProcedureCall {
        name: String,
        args: BTreeMap<String, Value>,
    },
    /// Run the step's `DO` children inline as a plain sub-sequence.
    Compound,
    /// Run `DO` when the condition held, `ELSE` otherwise.
    Branch { condition: bool },
    /// Run the `DO` children `count` times.
    Loop { count: u64 },
    /// Bind each item to the namespaced variable and run the `DO` children.
    ForEach { var: String, items: Vec<Value> },
    /// Run `DO`; on failure bind the error message to `error_var` and run
    /// `CATCH`.
    Try { error_var: String },
    /// Re-run the `DO` children up to `attempts` times, `delay` apart,
    /// stopping at the first fully passing attempt.
    Retry { attempts: u32, delay: Duration },
    /// Stop the enclosing procedure immediately, yielding this value.
    Return(Value),
    /// Short-circuit the remaining steps of the current test without
    /// failing it.
    Skip(String),
}

/// Fetch a required string parameter.
///
/// # Errors
///
/// Returns [`EngineError::invalid_param`] when the parameter is absent.
/// Non-string scalars are accepted and stringified.
pub fn require_str(params: &ResolvedParams, name: &str) -> Result<String, EngineError> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(EngineError::invalid_param(format!(
            "missing required parameter '{name}'"
        ))),
        Some(other) => Ok(scalar_to_string(other)),
    }
}

/// Fetch an optional string parameter.
pub fn opt_str(params: &ResolvedParams, name: &str) -> Option<String> {
    match params.get(name) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(scalar_to_string(other)),
    }
}

/// Fetch a required non-negative integer parameter, accepting numeric
/// strings (field inputs arrive as strings from some editors).
///
/// # Errors
///
/// Returns [`EngineError::invalid_param`] when absent or not a number.
pub fn require_u64(params: &ResolvedParams, name: &str) -> Result<u64, EngineError> {
    let value = params
        .get(name)
        .ok_or_else(|| EngineError::invalid_param(format!("missing required parameter '{name}'")))?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| EngineError::invalid_param(format!("parameter '{name}' must be a non-negative integer"))),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| {
            EngineError::invalid_param(format!("parameter '{name}' must be a non-negative integer"))
        }),
        _ => Err(EngineError::invalid_param(format!(
            "parameter '{name}' must be a non-negative integer"
        ))),
    }
}

/// Truthiness for block conditions: `false`, `0`, `""`, `null`, and the
/// string `"false"` are falsy (field inputs arrive as strings from the
/// editor); everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

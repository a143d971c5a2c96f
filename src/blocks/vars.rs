use serde_json::Value;
use tracing::{info, warn};

use crate::engine::context::ExecutionContext;
use crate::engine::handler::{
    BlockHandler, ParamShape, ResolvedParams, StepOutcome, opt_str, require_str,
};
use crate::engine::registry::BlockRegistry;
use crate::engine::resolve;
use crate::engine::result::EngineError;
use crate::model::step::Step;

pub(super) fn register(registry: &mut BlockRegistry) {
    registry.register(Box::new(SetVariable));
    registry.register(Box::new(Variable));
    registry.register(Box::new(Log));
}

struct SetVariable;

impl BlockHandler for SetVariable {
    fn name(&self) -> &str {
        "set_variable"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["name", "value"],
            value_inputs: &["value"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let name = require_str(params, "name")?;
        ctx.set_variable(name, params.get("value").cloned().unwrap_or(Value::Null));
        Ok(StepOutcome::Value(Value::Null))
    }
}

/// Value producer reading a variable by name, with the same precedence as
/// `${...}` placeholders (procedure parameter, data row, plain variable).
struct Variable;

impl BlockHandler for Variable {
    fn name(&self) -> &str {
        "variable"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["name"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let name = require_str(params, "name")?;
        Ok(StepOutcome::Value(
            resolve::lookup(&name, ctx).unwrap_or(Value::Null),
        ))
    }
}

struct Log;

impl BlockHandler for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["message", "level"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let message = require_str(params, "message")?;
        match opt_str(params, "level").as_deref() {
            Some("warn") => warn!(target: "blockrun::test", "{message}"),
            _ => info!(target: "blockrun::test", "{message}"),
        }
        Ok(StepOutcome::Value(Value::Null))
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::handler::{
    BlockHandler, ParamShape, ResolvedParams, StepOutcome, is_truthy, opt_str, require_str,
    require_u64,
};
use crate::engine::registry::BlockRegistry;
use crate::engine::result::EngineError;
use crate::model::step::Step;

pub(super) fn register(registry: &mut BlockRegistry) {
    registry.register(Box::new(If));
    registry.register(Box::new(Repeat));
    registry.register(Box::new(ForEach));
    registry.register(Box::new(TryCatch));
    registry.register(Box::new(Retry));
    registry.register(Box::new(Group));
    registry.register(Box::new(CallProcedure));
    registry.register(Box::new(Return));
    registry.register(Box::new(Skip));
}

struct If;

impl BlockHandler for If {
    fn name(&self) -> &str {
        "if"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["condition"],
            value_inputs: &["condition"],
            statement_inputs: &["DO", "ELSE"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let condition = params.get("condition").is_some_and(is_truthy);
        Ok(StepOutcome::Branch { condition })
    }
}

struct Repeat;

impl BlockHandler for Repeat {
    fn name(&self) -> &str {
        "repeat"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["count"],
            value_inputs: &["count"],
            statement_inputs: &["DO"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let count = require_u64(params, "count")?;
        Ok(StepOutcome::Loop { count })
    }
}

/// Iterate the `DO` children once per item, binding the loop variable the
/// same way a procedure parameter binds. A JSON-string `items` param is
/// parsed first, since field inputs arrive as strings from the editor.
struct ForEach;

impl BlockHandler for ForEach {
    fn name(&self) -> &str {
        "foreach"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["var", "items"],
            value_inputs: &["items"],
            statement_inputs: &["DO"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let var = require_str(params, "var")?;
        let items = match params.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) => match serde_json::from_str(s) {
                Ok(Value::Array(items)) => items,
                _ => {
                    return Err(EngineError::invalid_param(
                        "parameter 'items' must be an array",
                    ));
                }
            },
            _ => {
                return Err(EngineError::invalid_param(
                    "parameter 'items' must be an array",
                ));
            }
        };
        Ok(StepOutcome::ForEach { var, items })
    }
}

struct TryCatch;

impl BlockHandler for TryCatch {
    fn name(&self) -> &str {
        "try_catch"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["error_var"],
            value_inputs: &[],
            statement_inputs: &["DO", "CATCH"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let error_var = opt_str(params, "error_var").unwrap_or_else(|| "error".to_owned());
        Ok(StepOutcome::Try { error_var })
    }
}

struct Retry;

impl BlockHandler for Retry {
    fn name(&self) -> &str {
        "retry"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["attempts", "delay"],
            value_inputs: &[],
            statement_inputs: &["DO"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let attempts = match params.get("attempts") {
            Some(_) => u32::try_from(require_u64(params, "attempts")?).map_err(|_| {
                EngineError::invalid_param("parameter 'attempts' is out of range")
            })?,
            None => 3,
        };
        let delay = match params.get("delay") {
            Some(_) => Duration::from_millis(require_u64(params, "delay")?),
            None => Duration::ZERO,
        };
        Ok(StepOutcome::Retry { attempts, delay })
    }
}

struct Group;

impl BlockHandler for Group {
    fn name(&self) -> &str {
        "group"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["name"],
            value_inputs: &[],
            statement_inputs: &["DO"],
        }
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        Ok(StepOutcome::Compound)
    }
}

/// Generic call-by-name, for programs authored without a per-procedure
/// block type. `args` is an object of already-resolved argument values.
struct CallProcedure;

impl BlockHandler for CallProcedure {
    fn name(&self) -> &str {
        "call_procedure"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["name", "args"],
            value_inputs: &["args"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let name = require_str(params, "name")?;
        let mut args = BTreeMap::new();
        if let Some(Value::Object(map)) = params.get("args") {
            for (key, value) in map {
                args.insert(key.clone(), value.clone());
            }
        }
        Ok(StepOutcome::ProcedureCall { name, args })
    }
}

struct Return;

impl BlockHandler for Return {
    fn name(&self) -> &str {
        "return"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["value"],
            value_inputs: &["value"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        Ok(StepOutcome::Return(
            params.get("value").cloned().unwrap_or(Value::Null),
        ))
    }
}

struct Skip;

impl BlockHandler for Skip {
    fn name(&self) -> &str {
        "skip"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["reason"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let reason = opt_str(params, "reason").unwrap_or_else(|| "skipped".to_owned());
        Ok(StepOutcome::Skip(reason))
    }
}

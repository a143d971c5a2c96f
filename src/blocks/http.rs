use std::time::Duration;

use serde_json::Value;

use crate::driver::HttpRequest;
use crate::engine::context::ExecutionContext;
use crate::engine::handler::{
    BlockHandler, ParamShape, ResolvedParams, StepOutcome, opt_str, require_str, require_u64,
};
use crate::engine::registry::BlockRegistry;
use crate::engine::result::EngineError;
use crate::model::step::Step;

pub(super) fn register(registry: &mut BlockRegistry) {
    registry.register(Box::new(Request));
    registry.register(Box::new(ResponseStatus));
    registry.register(Box::new(ResponseBody));
    registry.register(Box::new(ResponseJson));
    registry.register(Box::new(AssertStatus));
}

fn recorded_response(ctx: &ExecutionContext) -> Result<&crate::driver::HttpResponse, EngineError> {
    ctx.last_response.as_ref().ok_or_else(|| {
        EngineError::invalid_param("no HTTP response recorded; run an http_request step first")
    })
}

/// Perform an HTTP request through the driver and record the response for
/// the `response_*` value producers and `assert_status`. Yields the status
/// code as its output.
struct Request;

impl BlockHandler for Request {
    fn name(&self) -> &str {
        "http_request"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["method", "url", "headers", "body", "timeout"],
            ..ParamShape::default()
        }
    }

    fn driver_dependent(&self) -> bool {
        true
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let method = opt_str(params, "method")
            .unwrap_or_else(|| "GET".to_owned())
            .to_uppercase();
        let url = require_str(params, "url")?;
        let mut headers = Vec::new();
        if let Some(Value::Object(map)) = params.get("headers") {
            for (name, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                headers.push((name.clone(), value));
            }
        }
        let body = match params.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let timeout = match params.get("timeout") {
            Some(_) => Duration::from_millis(require_u64(params, "timeout")?),
            None => ctx.timeout,
        };

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        };
        let response = ctx.driver()?.request(&request)?;
        let status = response.status;
        ctx.last_response = Some(response);
        Ok(StepOutcome::Value(Value::from(status)))
    }
}

struct ResponseStatus;

impl BlockHandler for ResponseStatus {
    fn name(&self) -> &str {
        "response_status"
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let status = recorded_response(ctx)?.status;
        Ok(StepOutcome::Value(Value::from(status)))
    }
}

struct ResponseBody;

impl BlockHandler for ResponseBody {
    fn name(&self) -> &str {
        "response_body"
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let body = recorded_response(ctx)?.body.clone();
        Ok(StepOutcome::Value(Value::String(body)))
    }
}

struct ResponseJson;

impl BlockHandler for ResponseJson {
    fn name(&self) -> &str {
        "response_json"
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let json = recorded_response(ctx)?
            .json()
            .ok_or_else(|| EngineError::invalid_param("response body is not valid JSON"))?;
        Ok(StepOutcome::Value(json))
    }
}

struct AssertStatus;

impl BlockHandler for AssertStatus {
    fn name(&self) -> &str {
        "assert_status"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["expected"],
            ..ParamShape::default()
        }
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let expected = require_u64(params, "expected")?;
        let actual = u64::from(recorded_response(ctx)?.status);
        if actual == expected {
            Ok(StepOutcome::Value(Value::Null))
        } else {
            Err(EngineError::assertion(format!(
                "expected status {expected}, got {actual}"
            )))
        }
    }
}

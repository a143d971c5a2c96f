use std::time::Duration;

use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::handler::{
    BlockHandler, ParamShape, ResolvedParams, StepOutcome, is_truthy, opt_str, require_str,
    require_u64,
};
use crate::engine::registry::BlockRegistry;
use crate::engine::result::{EngineError, EngineErrorKind};
use crate::model::step::Step;

pub(super) fn register(registry: &mut BlockRegistry) {
    registry.register(Box::new(Navigate));
    registry.register(Box::new(Click));
    registry.register(Box::new(Fill));
    registry.register(Box::new(SelectOption));
    registry.register(Box::new(Hover));
    registry.register(Box::new(Wait));
    registry.register(Box::new(GetText));
    registry.register(Box::new(GetAttribute));
    registry.register(Box::new(GetTitle));
    registry.register(Box::new(GetUrl));
    registry.register(Box::new(Screenshot));
}

struct Navigate;

impl BlockHandler for Navigate {
    fn name(&self) -> &str {
        "navigate"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["url"],
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
        let url = require_str(params, "url")?;
        ctx.driver()?.navigate(&url)?;
        Ok(StepOutcome::Value(Value::Null))
    }
}

struct Click;

impl BlockHandler for Click {
    fn name(&self) -> &str {
        "click"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector"],
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
        let selector = require_str(params, "selector")?;
        ctx.driver()?.click(&selector)?;
        Ok(StepOutcome::Value(Value::Null))
    }
}

struct Fill;

impl BlockHandler for Fill {
    fn name(&self) -> &str {
        "fill"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector", "value"],
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
        let selector = require_str(params, "selector")?;
        let value = require_str(params, "value")?;
        ctx.driver()?.fill(&selector, &value)?;
        Ok(StepOutcome::Value(Value::Null))
    }
}

struct SelectOption;

impl BlockHandler for SelectOption {
    fn name(&self) -> &str {
        "select"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector", "value"],
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
        let selector = require_str(params, "selector")?;
        let value = require_str(params, "value")?;
        ctx.driver()?.select(&selector, &value)?;
        Ok(StepOutcome::Value(Value::Null))
    }
}

struct Hover;

impl BlockHandler for Hover {
    fn name(&self) -> &str {
        "hover"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector"],
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
        let selector = require_str(params, "selector")?;
        ctx.driver()?.hover(&selector)?;
        Ok(StepOutcome::Value(Value::Null))
    }
}

/// Wait for a selector to reach a state, or for a fixed duration when only
/// `duration` (milliseconds) is given. The authoring tool emits the
/// duration form between browser steps, so this block still counts as
/// driver-dependent.
struct Wait;

impl BlockHandler for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector", "state", "timeout", "duration"],
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
        if let Some(selector) = opt_str(params, "selector") {
            let state = opt_str(params, "state").unwrap_or_else(|| "visible".to_owned());
            let timeout = match params.get("timeout") {
                Some(_) => Duration::from_millis(require_u64(params, "timeout")?),
                None => ctx.timeout,
            };
            ctx.driver()?.wait_for(&selector, &state, timeout)?;
        } else {
            let ms = require_u64(params, "duration")?;
            std::thread::sleep(Duration::from_millis(ms));
        }
        Ok(StepOutcome::Value(Value::Null))
    }
}

struct GetText;

impl BlockHandler for GetText {
    fn name(&self) -> &str {
        "get_text"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector"],
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
        let selector = require_str(params, "selector")?;
        let text = ctx.driver()?.get_text(&selector)?;
        Ok(StepOutcome::Value(Value::String(text)))
    }
}

struct GetAttribute;

impl BlockHandler for GetAttribute {
    fn name(&self) -> &str {
        "get_attribute"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["selector", "attribute"],
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
        let selector = require_str(params, "selector")?;
        let attribute = require_str(params, "attribute")?;
        let value = ctx.driver()?.get_attribute(&selector, &attribute)?;
        Ok(StepOutcome::Value(Value::String(value)))
    }
}

struct GetTitle;

impl BlockHandler for GetTitle {
    fn name(&self) -> &str {
        "get_title"
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn driver_dependent(&self) -> bool {
        true
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let title = ctx.driver()?.get_title()?;
        Ok(StepOutcome::Value(Value::String(title)))
    }
}

struct GetUrl;

impl BlockHandler for GetUrl {
    fn name(&self) -> &str {
        "get_url"
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn driver_dependent(&self) -> bool {
        true
    }

    fn execute(
        &self,
        _step: &Step,
        _params: &ResolvedParams,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let url = ctx.driver()?.get_url()?;
        Ok(StepOutcome::Value(Value::String(url)))
    }
}

/// Capture a screenshot. With a `path` param the bytes are written there;
/// without one the capture is only logged (failure screenshots are the
/// interpreter's job, not this block's).
struct Screenshot;

impl BlockHandler for Screenshot {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn shape(&self) -> ParamShape {
        ParamShape {
            fields: &["path", "full_page"],
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
        let full_page = params.get("full_page").is_none_or(is_truthy);
        let bytes = ctx.driver()?.screenshot(full_page)?;
        if let Some(path) = opt_str(params, "path") {
            std::fs::write(&path, &bytes).map_err(|e| {
                EngineError::new(
                    EngineErrorKind::Driver,
                    format!("failed to write screenshot to '{path}': {e}"),
                )
            })?;
        } else {
            tracing::debug!(bytes = bytes.len(), "screenshot captured");
        }
        Ok(StepOutcome::Value(Value::Null))
    }
}

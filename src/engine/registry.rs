use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::engine::context::ExecutionContext;
use crate::engine::handler::{BlockHandler, ParamShape, ResolvedParams, StepOutcome};
use crate::engine::plugin::Plugin;
use crate::engine::result::EngineError;
use crate::model::extract::SocketInfo;
use crate::model::step::Step;
use crate::model::suite::Procedure;

/// Process-wide mapping from step-type name to handler.
///
/// Open by design: plugins and procedure registration add types at runtime.
/// Registration is idempotent — the first handler registered under a name
/// wins, so repeated suite loads cannot clobber each other.
pub struct BlockRegistry {
    handlers: HashMap<String, Box<dyn BlockHandler>>,
}

impl BlockRegistry {
    /// An empty registry (useful for tests).
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry populated with every built-in block handler.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::blocks::register_builtins(&mut registry);
        registry
    }

    /// Register a handler under its own name. A no-op if the name is
    /// already taken.
    pub fn register(&mut self, handler: Box<dyn BlockHandler>) {
        let name = handler.name().to_owned();
        if self.handlers.contains_key(&name) {
            debug!(step_type = %name, "handler already registered, keeping first");
            return;
        }
        self.handlers.insert(name, handler);
    }

    /// Register a synthetic handler for an authored procedure so it can be
    /// invoked as an ordinary step type.
    pub fn register_procedure(&mut self, procedure: &Procedure) {
        self.register(Box::new(ProcedureBlock {
            procedure_name: procedure.name.clone(),
            params: procedure
                .params
                .iter()
                .map(|p| (p.name.clone(), p.default.clone()))
                .collect(),
        }));
    }

    pub fn get(&self, step_type: &str) -> Option<&dyn BlockHandler> {
        self.handlers.get(step_type).map(Box::as_ref)
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.handlers.contains_key(step_type)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketInfo for BlockRegistry {
    fn is_statement_socket(&self, step_type: &str, input: &str) -> bool {
        self.get(step_type)
            .is_some_and(|h| h.shape().statement_inputs.contains(&input))
    }
}

/// Synthetic handler backing one authored procedure: collects the declared
/// parameters (falling back to declared defaults) and requests a procedure
/// call from the interpreter.
struct ProcedureBlock {
    procedure_name: String,
    params: Vec<(String, Option<Value>)>,
}

impl BlockHandler for ProcedureBlock {
    fn name(&self) -> &str {
        &self.procedure_name
    }

    fn shape(&self) -> ParamShape {
        ParamShape::default()
    }

    fn execute(
        &self,
        _step: &Step,
        params: &ResolvedParams,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, EngineError> {
        let mut args = BTreeMap::new();
        for (name, default) in &self.params {
            let value = params
                .get(name)
                .cloned()
                .or_else(|| default.clone())
                .unwrap_or(Value::Null);
            args.insert(name.clone(), value);
        }
        Ok(StepOutcome::ProcedureCall {
            name: self.procedure_name.clone(),
            args,
        })
    }
}

/// Explicit owner of the cross-run tables: block handlers, project-level
/// procedures, and plugins. Constructed once per process or per run and
/// passed by reference — no hidden globals to leak across parallel workers.
pub struct EngineRuntime {
    pub registry: BlockRegistry,
    pub procedures: HashMap<String, Procedure>,
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl EngineRuntime {
    pub fn new(registry: BlockRegistry) -> Self {
        Self {
            registry,
            procedures: HashMap::new(),
            plugins: Vec::new(),
        }
    }

    /// Register a project-level procedure: both into the procedure table
    /// and as a callable step type.
    pub fn add_procedure(&mut self, procedure: Procedure) {
        self.registry.register_procedure(&procedure);
        self.procedures.insert(procedure.name.clone(), procedure);
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::suite::ProcedureParam;
    use serde_json::json;

    struct NoopBlock {
        type_name: &'static str,
        marker: Value,
    }

    impl BlockHandler for NoopBlock {
        fn name(&self) -> &str {
            self.type_name
        }

        fn shape(&self) -> ParamShape {
            ParamShape {
                statement_inputs: &["DO"],
                ..ParamShape::default()
            }
        }

        fn execute(
            &self,
            _step: &Step,
            _params: &ResolvedParams,
            _ctx: &mut ExecutionContext,
        ) -> Result<StepOutcome, EngineError> {
            Ok(StepOutcome::Value(self.marker.clone()))
        }
    }

    fn noop(name: &'static str, marker: Value) -> Box<dyn BlockHandler> {
        Box::new(NoopBlock {
            type_name: name,
            marker,
        })
    }

    #[test]
    fn register_and_get() {
        let mut reg = BlockRegistry::new();
        reg.register(noop("wait", json!(1)));
        assert!(reg.contains("wait"));
        assert!(reg.get("other").is_none());
    }

    #[test]
    fn registration_is_idempotent_first_wins() {
        let mut reg = BlockRegistry::new();
        reg.register(noop("wait", json!("first")));
        reg.register(noop("wait", json!("second")));

        let mut ctx = ExecutionContext::new();
        let step = Step::new("wait");
        let outcome = reg
            .get("wait")
            .unwrap()
            .execute(&step, &ResolvedParams::new(), &mut ctx)
            .unwrap();
        assert_eq!(outcome, StepOutcome::Value(json!("first")));
    }

    #[test]
    fn list_is_sorted() {
        let mut reg = BlockRegistry::new();
        reg.register(noop("z_block", json!(0)));
        reg.register(noop("a_block", json!(0)));
        assert_eq!(reg.list(), vec!["a_block", "z_block"]);
    }

    #[test]
    fn registry_reports_statement_sockets() {
        let mut reg = BlockRegistry::new();
        reg.register(noop("repeat", json!(0)));
        assert!(reg.is_statement_socket("repeat", "DO"));
        assert!(!reg.is_statement_socket("repeat", "count"));
        assert!(!reg.is_statement_socket("unknown", "DO"));
    }

    #[test]
    fn procedure_block_requests_call_with_defaults() {
        let mut reg = BlockRegistry::new();
        reg.register_procedure(&Procedure {
            name: "login_as".into(),
            description: None,
            params: vec![
                ProcedureParam {
                    name: "user".into(),
                    param_type: None,
                    default: Some(json!("guest")),
                },
                ProcedureParam {
                    name: "password".into(),
                    param_type: None,
                    default: None,
                },
            ],
            steps: vec![],
        });

        let mut ctx = ExecutionContext::new();
        let step = Step::new("login_as");
        let mut params = ResolvedParams::new();
        params.insert("password".into(), json!("secret"));

        let outcome = reg
            .get("login_as")
            .unwrap()
            .execute(&step, &params, &mut ctx)
            .unwrap();
        match outcome {
            StepOutcome::ProcedureCall { name, args } => {
                assert_eq!(name, "login_as");
                assert_eq!(args["user"], json!("guest"));
                assert_eq!(args["password"], json!("secret"));
            }
            other => panic!("expected procedure call, got {other:?}"),
        }
    }

    #[test]
    fn runtime_add_procedure_registers_step_type() {
        let mut runtime = EngineRuntime::new(BlockRegistry::new());
        runtime.add_procedure(Procedure {
            name: "reset_db".into(),
            description: None,
            params: vec![],
            steps: vec![],
        });
        assert!(runtime.registry.contains("reset_db"));
        assert!(runtime.procedures.contains_key("reset_db"));
    }
}

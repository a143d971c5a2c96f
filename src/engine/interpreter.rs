use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::driver::DriverFactory;
use crate::engine::context::{CancelToken, ExecutionContext, PARAM_NS};
use crate::engine::handler::{ResolvedParams, StepOutcome};
use crate::engine::registry::EngineRuntime;
use crate::engine::resolve::resolve_value;
use crate::engine::result::{
    DataSetRef, EngineError, EngineErrorKind, FileResult, RunSummary, StepResult, StepStatus,
    TestResult,
};
use crate::model::data::DataSet;
use crate::model::step::{ParamValue, Step};
use crate::model::suite::{FolderHooks, Suite, TestCase};

/// Configuration for one engine run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Timeout applied uniformly to driver operations.
    pub timeout: Duration,
    /// Project-level variable overrides, applied over suite defaults.
    pub variables: BTreeMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            variables: BTreeMap::new(),
        }
    }
}

/// How a step sequence ended.
#[derive(Debug)]
enum Flow {
    Completed,
    Failed(EngineError),
    Returned(Value),
    Skipped(String),
}

/// How a single step ended, carrying its result record.
enum StepFlow {
    Done(StepResult),
    Returned(Value, StepResult),
    Skipped(String, StepResult),
}

impl StepFlow {
    fn result(&self) -> &StepResult {
        match self {
            Self::Done(r) | Self::Returned(_, r) | Self::Skipped(_, r) => r,
        }
    }
}

/// Suite hooks with folder-contributed hooks merged in: outermost folder
/// first for before-hooks, innermost first (ending at the outermost) for
/// after-hooks, so teardown nests LIFO relative to setup.
struct MergedHooks {
    before_all: Vec<Step>,
    after_all: Vec<Step>,
    before_each: Vec<Step>,
    after_each: Vec<Step>,
}

fn merge_hooks(folders: &[FolderHooks], suite: &Suite) -> MergedHooks {
    let before = |pick: fn(&FolderHooks) -> &Vec<Step>, own: &Vec<Step>| {
        let mut steps: Vec<Step> = folders.iter().flat_map(|f| pick(f).clone()).collect();
        steps.extend(own.clone());
        steps
    };
    let after = |pick: fn(&FolderHooks) -> &Vec<Step>, own: &Vec<Step>| {
        let mut steps = own.clone();
        steps.extend(folders.iter().rev().flat_map(|f| pick(f).clone()));
        steps
    };
    MergedHooks {
        before_all: before(|f| &f.before_all, &suite.before_all),
        after_all: after(|f| &f.after_all, &suite.after_all),
        before_each: before(|f| &f.before_each, &suite.before_each),
        after_each: after(|f| &f.after_each, &suite.after_each),
    }
}

/// The block interpreter: walks suite → test → step, applies lifecycle
/// hooks, fans out data-driven iterations, aggregates soft assertions, and
/// decides pass/fail/skip/error per test.
///
/// Execution is strictly sequential; the interpreter assumes exclusive
/// ownership of its runtime and driver session for the duration of a run.
pub struct Interpreter {
    runtime: EngineRuntime,
    factory: Box<dyn DriverFactory>,
    config: RunConfig,
    cancel: CancelToken,
}

impl Interpreter {
    pub fn new(runtime: EngineRuntime, factory: Box<dyn DriverFactory>, config: RunConfig) -> Self {
        Self {
            runtime,
            factory,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// A clone of the cancellation token; cancelling it stops the run at
    /// the next step boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute one test file: merged `beforeAll` → tests (with per-test and
    /// data-driven fan-out) → merged `afterAll`, tearing the driver session
    /// down exactly once at the end regardless of earlier failures.
    pub fn run_file(&mut self, suite: &Suite, folders: &[FolderHooks]) -> FileResult {
        let start = Instant::now();
        for procedure in suite.procedures.values() {
            self.runtime.registry.register_procedure(procedure);
        }

        let mut results: Vec<TestResult> = Vec::new();

        // An all-disabled file pays no setup cost: skip records only.
        if suite.all_disabled() {
            for test in &suite.tests {
                results.push(TestResult::skipped(&test.id, &test.name));
            }
            return self.finish(suite, results, start);
        }

        let merged = merge_hooks(folders, suite);
        let mut session = None;

        // beforeAll
        let mut shared_vars: Option<BTreeMap<String, Value>> = None;
        let mut before_all_failed = false;
        if merged.before_all.is_empty() {
            shared_vars = Some(BTreeMap::new());
        } else {
            debug!(suite = %suite.name, "running beforeAll hooks");
            let mut ctx = self.seed_context(suite, None, None, false);
            let mut hook_steps = Vec::new();
            if let Some(s) = session.take() {
                ctx.attach_session(s);
            }
            let flow = self.run_sequence(&merged.before_all, &mut ctx, &mut hook_steps);
            session = ctx.take_session();
            match flow {
                Flow::Failed(err) => {
                    before_all_failed = true;
                    results.push(TestResult {
                        test_id: "beforeAll".into(),
                        test_name: "beforeAll hook".into(),
                        status: StepStatus::Error,
                        duration: start.elapsed(),
                        steps: hook_steps,
                        error: Some(EngineError {
                            kind: EngineErrorKind::HookFailure,
                            message: format!("beforeAll failed: {}", err.message),
                            detail: err.detail,
                        }),
                        dataset: None,
                    });
                }
                _ => shared_vars = Some(ctx.variables),
            }
        }

        // Tests (skipped entirely when setup failed; cleanup still owed).
        if !before_all_failed {
            let shared = shared_vars.clone().unwrap_or_default();
            for test in &suite.tests {
                if test.disabled {
                    results.push(TestResult::skipped(&test.id, &test.name));
                    continue;
                }
                if test.datasets.is_empty() {
                    results.push(self.run_test(suite, &merged, test, &shared, None, &mut session));
                } else {
                    for (index, dataset) in test.datasets.iter().enumerate() {
                        results.push(self.run_test(
                            suite,
                            &merged,
                            test,
                            &shared,
                            Some((dataset, index)),
                            &mut session,
                        ));
                    }
                }
            }
        }

        // afterAll runs even when beforeAll failed; its failures are
        // logged without masking the primary result.
        if !merged.after_all.is_empty() {
            debug!(suite = %suite.name, "running afterAll hooks");
            let mut ctx =
                self.seed_context(suite, shared_vars.as_ref(), None, false);
            if let Some(s) = session.take() {
                ctx.attach_session(s);
            }
            let mut hook_steps = Vec::new();
            if let Flow::Failed(err) = self.run_sequence(&merged.after_all, &mut ctx, &mut hook_steps)
            {
                warn!(suite = %suite.name, error = %err, "afterAll hook failed");
            }
            session = ctx.take_session();
        }

        if let Some(mut driver) = session {
            if let Err(e) = driver.close() {
                warn!(error = %e, "driver session teardown failed");
            }
        }

        self.finish(suite, results, start)
    }

    fn finish(&self, suite: &Suite, results: Vec<TestResult>, start: Instant) -> FileResult {
        let summary = RunSummary::from_results(&results);
        FileResult {
            suite_name: suite.name.clone(),
            results,
            total_duration: start.elapsed(),
            summary,
        }
    }

    /// Seed a fresh context: suite defaults < project overrides <
    /// selectively inherited beforeAll variables < data-row values.
    fn seed_context(
        &self,
        suite: &Suite,
        shared: Option<&BTreeMap<String, Value>>,
        dataset: Option<(&DataSet, usize)>,
        soft_assertions: bool,
    ) -> ExecutionContext {
        let mut vars = suite.default_variables();
        for (name, value) in &self.config.variables {
            vars.insert(name.clone(), value.clone());
        }
        if let Some(shared) = shared {
            for (name, value) in shared {
                let empty = vars
                    .get(name)
                    .is_some_and(|v| v == &Value::String(String::new()));
                if !vars.contains_key(name) || empty || name.starts_with(PARAM_NS) {
                    vars.insert(name.clone(), value.clone());
                }
            }
        }

        let mut ctx = ExecutionContext::new();
        ctx.variables = vars;
        if let Some((dataset, index)) = dataset {
            for (name, value) in &dataset.values {
                ctx.variables.insert(name.clone(), value.clone());
            }
            ctx.dataset = Some(dataset.clone());
            ctx.dataset_index = index;
        }
        ctx.procedures = suite.procedures.clone();
        ctx.soft_failures = soft_assertions.then(Vec::new);
        ctx.cancel = self.cancel.clone();
        ctx.timeout = self.config.timeout;
        ctx
    }

    /// Run one test (one fan-out iteration): suite.beforeEach →
    /// test.beforeEach → steps → test.afterEach → suite.afterEach, with the
    /// after-hooks always run and their failures logged, not propagated.
    fn run_test(
        &self,
        suite: &Suite,
        merged: &MergedHooks,
        test: &TestCase,
        shared: &BTreeMap<String, Value>,
        dataset: Option<(&DataSet, usize)>,
        session: &mut Option<Box<dyn crate::driver::Driver>>,
    ) -> TestResult {
        let start = Instant::now();
        let mut ctx = self.seed_context(suite, Some(shared), dataset, test.soft_assertions);
        if let Some(s) = session.take() {
            ctx.attach_session(s);
        }
        for plugin in &self.runtime.plugins {
            plugin.before_test(&mut ctx, test);
        }

        let mut steps: Vec<StepResult> = Vec::new();
        let mut error: Option<EngineError> = None;
        let mut skipped_reason: Option<String> = None;

        // Before-hooks; a failure here is the test's error and its steps
        // never run. A skip raised in a hook skips the whole test.
        for hook in [&merged.before_each, &test.before_each] {
            if error.is_some() || skipped_reason.is_some() {
                break;
            }
            match self.run_sequence(hook, &mut ctx, &mut steps) {
                Flow::Completed | Flow::Returned(_) => {}
                Flow::Failed(err) => {
                    error = Some(EngineError {
                        kind: EngineErrorKind::HookFailure,
                        message: format!("beforeEach failed: {}", err.message),
                        detail: err.detail,
                    });
                }
                Flow::Skipped(reason) => skipped_reason = Some(reason),
            }
        }

        if error.is_none() && skipped_reason.is_none() {
            match self.run_sequence(&test.steps, &mut ctx, &mut steps) {
                Flow::Completed | Flow::Returned(_) => {}
                Flow::Failed(err) => error = Some(err),
                Flow::Skipped(reason) => skipped_reason = Some(reason),
            }
        }

        // After-hooks always run; an exception inside one is logged but
        // does not abort the remaining teardown chain.
        for hook in [&test.after_each, &merged.after_each] {
            if let Flow::Failed(err) = self.run_sequence(hook, &mut ctx, &mut steps) {
                warn!(test = %test.name, error = %err, "afterEach hook failed");
            }
        }

        // Soft assertion aggregation: only when no harder failure occurred.
        if error.is_none() && skipped_reason.is_none() {
            if let Some(failures) = ctx.soft_failures.as_ref().filter(|f| !f.is_empty()) {
                let listing = failures
                    .iter()
                    .enumerate()
                    .map(|(i, m)| format!("{}) {m}", i + 1))
                    .collect::<Vec<_>>()
                    .join("; ");
                error = Some(EngineError::assertion(format!(
                    "{} soft assertion failure(s): {listing}",
                    failures.len()
                )));
            }
        }

        let status = if let Some(reason) = &skipped_reason {
            debug!(test = %test.name, reason = %reason, "test skipped");
            StepStatus::Skipped
        } else {
            match &error {
                None => StepStatus::Passed,
                Some(e) if e.kind == EngineErrorKind::AssertionFailed => StepStatus::Failed,
                Some(_) => StepStatus::Error,
            }
        };

        let result = TestResult {
            test_id: test.id.clone(),
            test_name: test.name.clone(),
            status,
            duration: start.elapsed(),
            steps,
            error,
            dataset: dataset.map(|(ds, index)| DataSetRef {
                name: ds.label(index),
                index,
            }),
        };
        for plugin in &self.runtime.plugins {
            plugin.after_test(&mut ctx, test, &result);
        }
        *session = ctx.take_session();
        result
    }

    /// Execute steps in order. A failed or errored step short-circuits the
    /// rest of the sequence unless the failure is a soft-recorded
    /// assertion.
    fn run_sequence(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> Flow {
        for step in steps {
            if ctx.cancel.is_cancelled() {
                let err = EngineError::new(EngineErrorKind::Cancelled, "run cancelled");
                out.push(StepResult::from_error(
                    step.display_id(),
                    &step.step_type,
                    Duration::ZERO,
                    err.clone(),
                ));
                return Flow::Failed(err);
            }

            match self.execute_step(step, ctx, out) {
                StepFlow::Done(result) => {
                    let is_assertion = result
                        .error
                        .as_ref()
                        .is_some_and(|e| e.kind == EngineErrorKind::AssertionFailed);
                    if result.status == StepStatus::Failed
                        && is_assertion
                        && ctx.soft_assertions_enabled()
                    {
                        let message = result
                            .error
                            .as_ref()
                            .map(|e| e.message.clone())
                            .unwrap_or_default();
                        ctx.record_soft_failure(message);
                        out.push(result);
                        continue;
                    }
                    if matches!(result.status, StepStatus::Failed | StepStatus::Error) {
                        let err = result.error.clone().unwrap_or_else(|| {
                            EngineError::new(EngineErrorKind::Driver, "step failed")
                        });
                        let mut result = result;
                        self.capture_failure_screenshot(ctx, &mut result);
                        out.push(result);
                        return Flow::Failed(err);
                    }
                    out.push(result);
                }
                StepFlow::Returned(value, result) => {
                    out.push(result);
                    return Flow::Returned(value);
                }
                StepFlow::Skipped(reason, result) => {
                    out.push(result);
                    return Flow::Skipped(reason);
                }
            }
        }
        Flow::Completed
    }

    /// Execute one step: resolve its parameters (evaluating nested value
    /// blocks first), dispatch to the handler, and act on the returned
    /// control sentinel.
    fn execute_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> StepFlow {
        let start = Instant::now();
        for plugin in &self.runtime.plugins {
            plugin.before_step(ctx, step);
        }

        let flow = self.execute_step_inner(step, ctx, out, start);

        for plugin in &self.runtime.plugins {
            plugin.after_step(ctx, step, flow.result());
        }
        flow
    }

    fn execute_step_inner(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
        start: Instant,
    ) -> StepFlow {
        let fail = |error: EngineError| {
            StepFlow::Done(StepResult::from_error(
                step.display_id(),
                &step.step_type,
                start.elapsed(),
                error,
            ))
        };

        let Some(handler) = self.runtime.registry.get(&step.step_type) else {
            return fail(EngineError::new(
                EngineErrorKind::UnknownType,
                format!("no handler registered for step type '{}'", step.step_type),
            ));
        };

        let params = match self.resolve_params(step, ctx, out) {
            Ok(params) => params,
            Err(e) => return fail(e),
        };

        // Lazy session: created at the first driver-dependent step of the
        // file run, never for files without one.
        if handler.driver_dependent() && !ctx.has_session() {
            match self.factory.create() {
                Ok(session) => ctx.attach_session(session),
                Err(e) => return fail(e.into()),
            }
        }

        let outcome = match handler.execute(step, &params, ctx) {
            Ok(outcome) => outcome,
            Err(e) => return fail(e),
        };

        let pass = |output: Option<Value>, elapsed: Duration| {
            StepFlow::Done(StepResult::passed(
                step.display_id(),
                &step.step_type,
                elapsed,
                output,
            ))
        };

        match outcome {
            StepOutcome::Value(value) => {
                let output = if value.is_null() { None } else { Some(value) };
                pass(output, start.elapsed())
            }
            StepOutcome::Compound => {
                self.container_flow(step, self.run_children(step, "DO", ctx, out), start)
            }
            StepOutcome::Branch { condition } => {
                let socket = if condition { "DO" } else { "ELSE" };
                self.container_flow(step, self.run_children(step, socket, ctx, out), start)
            }
            StepOutcome::Loop { count } => {
                let mut flow = Flow::Completed;
                for _ in 0..count {
                    flow = self.run_children(step, "DO", ctx, out);
                    if !matches!(flow, Flow::Completed) {
                        break;
                    }
                }
                self.container_flow(step, flow, start)
            }
            StepOutcome::ForEach { var, items } => {
                let key = format!("{PARAM_NS}{var}");
                let saved = ctx.variables.get(&key).cloned();
                let mut flow = Flow::Completed;
                for item in items {
                    ctx.variables.insert(key.clone(), item);
                    flow = self.run_children(step, "DO", ctx, out);
                    if !matches!(flow, Flow::Completed) {
                        break;
                    }
                }
                match saved {
                    Some(old) => ctx.variables.insert(key, old),
                    None => ctx.variables.remove(&key),
                };
                self.container_flow(step, flow, start)
            }
            StepOutcome::Try { error_var } => {
                let flow = match self.run_children(step, "DO", ctx, out) {
                    Flow::Failed(err) => {
                        ctx.set_variable(error_var, Value::String(err.message));
                        self.run_children(step, "CATCH", ctx, out)
                    }
                    other => other,
                };
                self.container_flow(step, flow, start)
            }
            StepOutcome::Retry { attempts, delay } => {
                self.run_retry(step, attempts, delay, ctx, out, start)
            }
            StepOutcome::ProcedureCall { name, args } => {
                match self.call_procedure(&name, args, ctx, out) {
                    Ok(value) => {
                        let output = if value.is_null() { None } else { Some(value) };
                        pass(output, start.elapsed())
                    }
                    Err(e) if e.kind == EngineErrorKind::Skip => {
                        let reason = e.message.clone();
                        StepFlow::Skipped(
                            reason,
                            StepResult::from_error(
                                step.display_id(),
                                &step.step_type,
                                start.elapsed(),
                                e,
                            ),
                        )
                    }
                    Err(e) => fail(e),
                }
            }
            StepOutcome::Return(value) => {
                let result = StepResult::passed(
                    step.display_id(),
                    &step.step_type,
                    start.elapsed(),
                    None,
                );
                StepFlow::Returned(value, result)
            }
            StepOutcome::Skip(reason) => {
                let result = StepResult::from_error(
                    step.display_id(),
                    &step.step_type,
                    start.elapsed(),
                    EngineError::new(EngineErrorKind::Skip, reason.clone()),
                );
                StepFlow::Skipped(reason, result)
            }
        }
    }

    /// Resolve a step's params: literals through placeholder substitution,
    /// nested value blocks by executing them first.
    fn resolve_params(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> Result<ResolvedParams, EngineError> {
        let mut params = ResolvedParams::new();
        for (name, param) in &step.params {
            let value = match param {
                ParamValue::Literal(v) => resolve_value(v, ctx),
                ParamValue::Block(inner) => self.eval_value_step(inner, ctx, out)?,
            };
            params.insert(name.clone(), value);
        }
        Ok(params)
    }

    /// Execute a nested value-producing step to its value. Procedure calls
    /// are allowed (the procedure's return value is the result); statement
    /// sentinels are not.
    fn eval_value_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> Result<Value, EngineError> {
        let handler = self.runtime.registry.get(&step.step_type).ok_or_else(|| {
            EngineError::new(
                EngineErrorKind::UnknownType,
                format!("no handler registered for step type '{}'", step.step_type),
            )
        })?;
        let params = self.resolve_params(step, ctx, out)?;
        if handler.driver_dependent() && !ctx.has_session() {
            ctx.attach_session(self.factory.create()?);
        }
        match handler.execute(step, &params, ctx)? {
            StepOutcome::Value(value) => Ok(value),
            StepOutcome::ProcedureCall { name, args } => {
                self.call_procedure(&name, args, ctx, out)
            }
            _ => Err(EngineError::invalid_param(format!(
                "step type '{}' cannot produce a value here",
                step.step_type
            ))),
        }
    }

    /// Invoke a procedure with the save/restore discipline: arguments were
    /// already resolved against the caller's context; parameter bindings
    /// are saved, overwritten for the callee, and restored afterwards
    /// (including on error and early-return paths), deleting names that
    /// did not exist before the call.
    fn call_procedure(
        &self,
        name: &str,
        args: BTreeMap<String, Value>,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> Result<Value, EngineError> {
        let procedure = ctx
            .procedures
            .get(name)
            .or_else(|| self.runtime.procedures.get(name))
            .cloned()
            .ok_or_else(|| {
                EngineError::new(
                    EngineErrorKind::ProcedureNotFound,
                    format!("procedure '{name}' not found"),
                )
            })?;

        let mut saved: Vec<(String, Option<Value>)> = Vec::with_capacity(args.len());
        for (param, value) in args {
            let key = format!("{PARAM_NS}{param}");
            saved.push((key.clone(), ctx.variables.get(&key).cloned()));
            ctx.variables.insert(key, value);
        }

        let flow = self.run_sequence(&procedure.steps, ctx, out);

        for (key, old) in saved {
            match old {
                Some(value) => ctx.variables.insert(key, value),
                None => ctx.variables.remove(&key),
            };
        }

        match flow {
            Flow::Completed => Ok(Value::Null),
            Flow::Returned(value) => Ok(value),
            Flow::Failed(err) => Err(err),
            Flow::Skipped(reason) => Err(EngineError::new(EngineErrorKind::Skip, reason)),
        }
    }

    /// Retry semantics: re-run the nested steps up to `attempts` times,
    /// stopping at the first fully passing attempt and waiting `delay`
    /// between attempts; only when every attempt fails does the step fail,
    /// carrying the last attempt's error and step records.
    fn run_retry(
        &self,
        step: &Step,
        attempts: u32,
        delay: Duration,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
        start: Instant,
    ) -> StepFlow {
        let attempts = attempts.max(1);
        let mut scratch = Vec::new();
        for attempt in 1..=attempts {
            scratch.clear();
            match self.run_sequence(step.children_of("DO"), ctx, &mut scratch) {
                Flow::Completed => {
                    out.append(&mut scratch);
                    return StepFlow::Done(StepResult::passed(
                        step.display_id(),
                        &step.step_type,
                        start.elapsed(),
                        None,
                    ));
                }
                Flow::Failed(err) => {
                    if attempt == attempts {
                        out.append(&mut scratch);
                        return StepFlow::Done(StepResult::from_error(
                            step.display_id(),
                            &step.step_type,
                            start.elapsed(),
                            EngineError {
                                kind: err.kind,
                                message: format!(
                                    "all {attempts} attempt(s) failed; last error: {}",
                                    err.message
                                ),
                                detail: err.detail,
                            },
                        ));
                    }
                    debug!(
                        step = %step.display_id(),
                        attempt,
                        error = %err,
                        "retry attempt failed"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                other @ (Flow::Returned(_) | Flow::Skipped(_)) => {
                    out.append(&mut scratch);
                    return self.container_flow(step, other, start);
                }
            }
        }
        unreachable!("retry loop always returns from its last attempt")
    }

    fn run_children(
        &self,
        step: &Step,
        socket: &str,
        ctx: &mut ExecutionContext,
        out: &mut Vec<StepResult>,
    ) -> Flow {
        self.run_sequence(step.children_of(socket), ctx, out)
    }

    /// Map a child-sequence flow onto the container step's own record.
    fn container_flow(&self, step: &Step, flow: Flow, start: Instant) -> StepFlow {
        match flow {
            Flow::Completed => StepFlow::Done(StepResult::passed(
                step.display_id(),
                &step.step_type,
                start.elapsed(),
                None,
            )),
            Flow::Failed(err) => StepFlow::Done(StepResult::from_error(
                step.display_id(),
                &step.step_type,
                start.elapsed(),
                err,
            )),
            Flow::Returned(value) => StepFlow::Returned(
                value,
                StepResult::passed(step.display_id(), &step.step_type, start.elapsed(), None),
            ),
            Flow::Skipped(reason) => StepFlow::Skipped(
                reason.clone(),
                StepResult::from_error(
                    step.display_id(),
                    &step.step_type,
                    start.elapsed(),
                    EngineError::new(EngineErrorKind::Skip, reason),
                ),
            ),
        }
    }

    /// Best-effort full-page screenshot on failure; a capture failure can
    /// never itself fail a test.
    fn capture_failure_screenshot(&self, ctx: &mut ExecutionContext, result: &mut StepResult) {
        if !ctx.has_session() {
            return;
        }
        let capture = ctx
            .driver()
            .and_then(|d| d.screenshot(true).map_err(EngineError::from));
        match capture {
            Ok(bytes) => result.screenshot = Some(bytes),
            Err(e) => debug!(step = %result.id, error = %e, "failure screenshot not captured"),
        }
    }
}

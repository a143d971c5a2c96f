use crate::engine::context::ExecutionContext;
use crate::engine::result::{StepResult, TestResult};
use crate::model::step::Step;
use crate::model::suite::TestCase;

/// Hook contract satisfied by plugins. Every hook is optional; hooks are
/// invoked in registration order and may mutate the context but not step
/// identity (steps are passed by shared reference).
pub trait Plugin {
    fn name(&self) -> &str;

    fn before_test(&self, _ctx: &mut ExecutionContext, _test: &TestCase) {}

    fn after_test(&self, _ctx: &mut ExecutionContext, _test: &TestCase, _result: &TestResult) {}

    fn before_step(&self, _ctx: &mut ExecutionContext, _step: &Step) {}

    fn after_step(&self, _ctx: &mut ExecutionContext, _step: &Step, _result: &StepResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TagPlugin;

    impl Plugin for TagPlugin {
        fn name(&self) -> &str {
            "tag"
        }

        fn before_test(&self, ctx: &mut ExecutionContext, test: &TestCase) {
            ctx.set_variable("current_test", serde_json::json!(test.name));
        }
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Empty;
        impl Plugin for Empty {
            fn name(&self) -> &str {
                "empty"
            }
        }
        let mut ctx = ExecutionContext::new();
        let step = Step::new("log");
        Empty.before_step(&mut ctx, &step);
        assert!(ctx.variables.is_empty());
    }

    #[test]
    fn plugin_may_mutate_context() {
        let mut ctx = ExecutionContext::new();
        let test = TestCase {
            id: "t1".into(),
            name: "login".into(),
            steps: vec![],
            before_each: vec![],
            after_each: vec![],
            datasets: vec![],
            disabled: false,
            soft_assertions: false,
        };
        TagPlugin.before_test(&mut ctx, &test);
        assert_eq!(
            ctx.get_variable("current_test"),
            Some(&serde_json::json!("login"))
        );
    }
}

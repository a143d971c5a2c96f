//! Built-in block handlers, grouped by concern. `register_builtins` wires
//! every one into a registry; procedure blocks are registered separately as
//! suites and project config are loaded.

mod assert;
mod browser;
mod control;
mod http;
mod vars;

use crate::engine::registry::BlockRegistry;

pub fn register_builtins(registry: &mut BlockRegistry) {
    browser::register(registry);
    http::register(registry);
    assert::register(registry);
    vars::register(registry);
    control::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_the_documented_block_set() {
        let registry = BlockRegistry::with_builtins();
        for name in [
            "navigate",
            "click",
            "fill",
            "select",
            "hover",
            "wait",
            "get_text",
            "get_attribute",
            "get_title",
            "get_url",
            "screenshot",
            "http_request",
            "response_status",
            "response_body",
            "response_json",
            "assert_status",
            "assert_equals",
            "assert_contains",
            "set_variable",
            "variable",
            "log",
            "if",
            "repeat",
            "foreach",
            "try_catch",
            "retry",
            "group",
            "call_procedure",
            "return",
            "skip",
        ] {
            assert!(registry.contains(name), "missing builtin '{name}'");
        }
    }

    #[test]
    fn statement_sockets_are_declared_for_container_blocks() {
        use crate::model::extract::SocketInfo;
        let registry = BlockRegistry::with_builtins();
        assert!(registry.is_statement_socket("if", "DO"));
        assert!(registry.is_statement_socket("if", "ELSE"));
        assert!(registry.is_statement_socket("try_catch", "CATCH"));
        assert!(!registry.is_statement_socket("if", "condition"));
        assert!(!registry.is_statement_socket("navigate", "DO"));
    }
}

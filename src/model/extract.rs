use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;

use crate::model::step::{ParamValue, Step};

/// Tells the extractor which input sockets of a block type hold statement
/// chains rather than value-producing blocks. The block registry implements
/// this from handler shapes.
pub trait SocketInfo {
    fn is_statement_socket(&self, step_type: &str, input: &str) -> bool;
}

/// A [`SocketInfo`] with no statement sockets; every input is a value input.
pub struct NoStatementSockets;

impl SocketInfo for NoStatementSockets {
    fn is_statement_socket(&self, _step_type: &str, _input: &str) -> bool {
        false
    }
}

/// Flatten a serialized step program into an ordered `Step` list.
///
/// Accepts either an already-flat array of steps (backward compatibility)
/// or an authoring-editor graph of the shape
/// `{"blocks": {"blocks": [<root block>, ...]}}`, where each root block
/// starts a chain linked through `next`. Field values become literal
/// params; connected value blocks become nested steps; chains connected to
/// statement sockets become named children.
///
/// Malformed or type-less nodes yield no step and are skipped silently —
/// partially-edited authoring state must not fail the whole file.
pub fn extract_steps(program: &Value, sockets: &dyn SocketInfo) -> Vec<Step> {
    match program {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<Step>(item.clone()).ok())
            .filter(|s| !s.step_type.is_empty())
            .collect(),
        Value::Object(obj) => {
            let roots = obj
                .get("blocks")
                .and_then(|b| b.get("blocks"))
                .and_then(Value::as_array);
            let Some(roots) = roots else {
                return Vec::new();
            };
            let mut visited = HashSet::new();
            let mut steps = Vec::new();
            for root in roots {
                walk_chain(root, sockets, &mut visited, &mut steps);
            }
            steps
        }
        _ => Vec::new(),
    }
}

/// Walk a block chain linked through `next`, appending extracted steps.
fn walk_chain(
    first: &Value,
    sockets: &dyn SocketInfo,
    visited: &mut HashSet<String>,
    out: &mut Vec<Step>,
) {
    let mut node = Some(first);
    while let Some(current) = node {
        if let Some(step) = extract_node(current, sockets, visited) {
            out.push(step);
        }
        node = current.get("next").and_then(|n| n.get("block"));
    }
}

fn extract_node(
    node: &Value,
    sockets: &dyn SocketInfo,
    visited: &mut HashSet<String>,
) -> Option<Step> {
    let step_type = node.get("type").and_then(Value::as_str)?;
    if step_type.is_empty() {
        return None;
    }
    let id = node
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();
    // Re-encountering an id means the serialized graph loops; drop the node
    // rather than recursing forever.
    if !id.is_empty() && !visited.insert(id.clone()) {
        return None;
    }

    let mut step = Step::new(step_type).with_id(id);

    if let Some(Value::Object(fields)) = node.get("fields") {
        for (name, value) in fields {
            step.params
                .insert(name.clone(), ParamValue::Literal(value.clone()));
        }
    }

    if let Some(Value::Object(inputs)) = node.get("inputs") {
        for (name, socket) in inputs {
            let Some(inner) = socket.get("block").or_else(|| socket.get("shadow")) else {
                continue;
            };
            if sockets.is_statement_socket(step_type, name) {
                let mut children = Vec::new();
                walk_chain(inner, sockets, visited, &mut children);
                step.children.insert(name.clone(), children);
            } else if let Some(nested) = extract_node(inner, sockets, visited) {
                step.params
                    .insert(name.clone(), ParamValue::Block(Box::new(nested)));
            }
        }
    }

    Some(step)
}

/// Verify that no step reaches a step carrying its own id through params or
/// children, directly or transitively. Steps without authored ids are
/// ignored (they cannot be referenced).
///
/// # Errors
///
/// Returns a description of the offending cycle participant ids.
pub fn check_acyclic(steps: &[Step]) -> Result<(), String> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

    fn node_for(
        id: &str,
        graph: &mut DiGraph<String, ()>,
        nodes: &mut HashMap<String, NodeIndex>,
    ) -> NodeIndex {
        *nodes
            .entry(id.to_owned())
            .or_insert_with(|| graph.add_node(id.to_owned()))
    }

    fn add_edges(
        step: &Step,
        graph: &mut DiGraph<String, ()>,
        nodes: &mut HashMap<String, NodeIndex>,
    ) {
        let parent = if step.id.is_empty() {
            None
        } else {
            Some(node_for(&step.id, graph, nodes))
        };
        let mut nested: Vec<&Step> = step
            .params
            .values()
            .filter_map(|p| match p {
                ParamValue::Block(inner) => Some(inner.as_ref()),
                ParamValue::Literal(_) => None,
            })
            .collect();
        nested.extend(step.children.values().flatten());

        for child in nested {
            if let (Some(parent), false) = (parent, child.id.is_empty()) {
                let child_node = node_for(&child.id, graph, nodes);
                graph.add_edge(parent, child_node, ());
            }
            add_edges(child, graph, nodes);
        }
    }

    for step in steps {
        add_edges(step, &mut graph, &mut nodes);
    }

    if is_cyclic_directed(&graph) {
        Err("step graph is cyclic: a step reaches its own id through nested steps".into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ControlSockets;

    impl SocketInfo for ControlSockets {
        fn is_statement_socket(&self, step_type: &str, input: &str) -> bool {
            step_type == "repeat" && input == "DO"
        }
    }

    fn graph(blocks: Value) -> Value {
        json!({"blocks": {"languageVersion": 0, "blocks": blocks}})
    }

    #[test]
    fn extracts_flat_array() {
        let program = json!([
            {"type": "navigate", "params": {"url": "/"}},
            {"type": "click", "params": {"selector": "#go"}}
        ]);
        let steps = extract_steps(&program, &NoStatementSockets);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].step_type, "click");
    }

    #[test]
    fn flat_array_skips_malformed_entries() {
        let program = json!([
            {"type": "navigate"},
            {"params": {"no": "type"}},
            42,
            {"type": ""}
        ]);
        let steps = extract_steps(&program, &NoStatementSockets);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, "navigate");
    }

    #[test]
    fn walks_top_level_chain_via_next() {
        let program = graph(json!([{
            "type": "navigate", "id": "a",
            "fields": {"url": "/login"},
            "next": {"block": {
                "type": "click", "id": "b",
                "fields": {"selector": "#submit"}
            }}
        }]));
        let steps = extract_steps(&program, &ControlSockets);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_type, "navigate");
        assert_eq!(
            steps[0].params.get("url"),
            Some(&ParamValue::Literal(json!("/login")))
        );
        assert_eq!(steps[1].id, "b");
    }

    #[test]
    fn connected_value_block_becomes_nested_param() {
        let program = graph(json!([{
            "type": "assert_equals", "id": "a",
            "fields": {"expected": "Welcome"},
            "inputs": {"actual": {"block": {"type": "get_title", "id": "t"}}}
        }]));
        let steps = extract_steps(&program, &ControlSockets);
        match steps[0].params.get("actual").unwrap() {
            ParamValue::Block(inner) => assert_eq!(inner.step_type, "get_title"),
            ParamValue::Literal(v) => panic!("expected block, got {v}"),
        }
    }

    #[test]
    fn statement_socket_becomes_children_chain() {
        let program = graph(json!([{
            "type": "repeat", "id": "r",
            "fields": {"count": 2},
            "inputs": {"DO": {"block": {
                "type": "click", "id": "c1",
                "next": {"block": {"type": "click", "id": "c2"}}
            }}}
        }]));
        let steps = extract_steps(&program, &ControlSockets);
        assert_eq!(steps.len(), 1);
        let body = steps[0].children_of("DO");
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].id, "c2");
    }

    #[test]
    fn typeless_node_skipped_but_chain_continues() {
        let program = graph(json!([{
            "id": "broken",
            "next": {"block": {"type": "click", "id": "c"}}
        }]));
        let steps = extract_steps(&program, &ControlSockets);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, "c");
    }

    #[test]
    fn repeated_id_in_graph_is_dropped() {
        // A looping serialization must not hang the extractor.
        let program = graph(json!([{
            "type": "click", "id": "dup",
            "next": {"block": {"type": "click", "id": "dup"}}
        }]));
        let steps = extract_steps(&program, &ControlSockets);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn non_program_values_yield_nothing() {
        assert!(extract_steps(&json!("nope"), &NoStatementSockets).is_empty());
        assert!(extract_steps(&json!({"other": 1}), &NoStatementSockets).is_empty());
        assert!(extract_steps(&Value::Null, &NoStatementSockets).is_empty());
    }

    #[test]
    fn acyclic_tree_passes() {
        let steps = vec![
            Step::new("repeat").with_id("r").with_children(
                "DO",
                vec![Step::new("click").with_id("c")],
            ),
        ];
        assert!(check_acyclic(&steps).is_ok());
    }

    #[test]
    fn self_referencing_id_fails() {
        let steps = vec![Step::new("repeat").with_id("r").with_children(
            "DO",
            vec![Step::new("repeat").with_id("r")],
        )];
        assert!(check_acyclic(&steps).is_err());
    }

    #[test]
    fn transitive_cycle_fails() {
        let steps = vec![Step::new("group").with_id("a").with_children(
            "DO",
            vec![Step::new("group").with_id("b").with_children(
                "DO",
                vec![Step::new("noop").with_id("a")],
            )],
        )];
        assert!(check_acyclic(&steps).is_err());
    }

    #[test]
    fn nested_value_params_participate_in_cycle_check() {
        let steps = vec![
            Step::new("assert_equals")
                .with_id("x")
                .with_block_param("actual", Step::new("get_title").with_id("x")),
        ];
        assert!(check_acyclic(&steps).is_err());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One executable node of an authored test: a type name, a mapping of
/// parameter name to literal value or nested value-producing step, and
/// optionally named child step lists for statement containers.
///
/// Step graphs are trees flattened from the authoring editor's output;
/// [`crate::model::extract::check_acyclic`] enforces that no step reaches
/// its own id through params or children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<Step>>,
}

/// A step parameter: either a literal value or a nested step whose
/// execution yields the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Block(Box<Step>),
    Literal(Value),
}

impl Step {
    pub fn new(step_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            step_type: step_type.into(),
            params: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .insert(name.into(), ParamValue::Literal(value.into()));
        self
    }

    pub fn with_block_param(mut self, name: impl Into<String>, step: Step) -> Self {
        self.params
            .insert(name.into(), ParamValue::Block(Box::new(step)));
        self
    }

    pub fn with_children(mut self, socket: impl Into<String>, steps: Vec<Step>) -> Self {
        self.children.insert(socket.into(), steps);
        self
    }

    /// Child steps connected to the named statement socket.
    pub fn children_of(&self, socket: &str) -> &[Step] {
        self.children.get(socket).map_or(&[], Vec::as_slice)
    }

    /// Display id for results: the authored id, or the type name when the
    /// authoring tool did not assign one.
    pub fn display_id(&self) -> &str {
        if self.id.is_empty() {
            &self.step_type
        } else {
            &self.id
        }
    }
}

//! The typed IR consumed by the execution kernel.
//!
//! A successful compilation returns a single [`IrNode`] tree. The tree is
//! immutable, finite, and contains only primitive opcodes. Every input is
//! either a bound internal reference (`Name#stack_path`, optionally
//! suffixed by an iteration modifier) or an external project reference
//! (`Name:ResourceID@Version`); every output is a logical Job Document
//! name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::opcode::OpCode;
use crate::path::StackPath;
use crate::value::Value;

/// Input/output declarations of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Wiring {
    /// Ordered input references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Logical name of the produced artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Wiring {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.output.is_none()
    }
}

/// One node of the compiled tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    /// Deterministic structural identity.
    pub stack_path: StackPath,
    /// Primitive instruction code.
    pub opcode: OpCode,
    /// Opcode-specific static parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, Value>,
    /// Resolved input/output declarations.
    #[serde(default, skip_serializing_if = "Wiring::is_empty")]
    pub wiring: Wiring,
    /// Ordered children; empty for atoms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IrNode>,
}

impl IrNode {
    /// Pre-order traversal over the tree.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a IrNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Finds a node by stack path.
    pub fn find(&self, path: &StackPath) -> Option<&IrNode> {
        if &self.stack_path == path {
            return Some(self);
        }
        if !path.starts_with(&self.stack_path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Total node count of the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(IrNode::node_count).sum::<usize>()
    }
}

//! The untyped working tree.
//!
//! Between parsing and assembly the compiler operates on [`Node`]s: a
//! single record shape shared by every opcode, with per-opcode behaviour
//! living in pattern-matched pass functions rather than a type hierarchy.
//! Sugar opcodes exist only here; [`expand`](crate::expand) rewrites them
//! away before the typed IR is built.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use odl_types::{OpCode, StackPath, Value, Wiring};

/// A sugar opcode: recognized at the surface, absent from the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SugarOp {
    GenerateTeam,
    ApprovalGate,
    Ensemble,
    FanOut,
}

impl SugarOp {
    pub const ALL: [SugarOp; 4] = [
        SugarOp::GenerateTeam,
        SugarOp::ApprovalGate,
        SugarOp::Ensemble,
        SugarOp::FanOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SugarOp::GenerateTeam => "generate_team",
            SugarOp::ApprovalGate => "approval_gate",
            SugarOp::Ensemble => "ensemble",
            SugarOp::FanOut => "fan_out",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        SugarOp::ALL.iter().copied().find(|op| op.as_str() == key)
    }
}

impl fmt::Display for SugarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opcode of a surface node: a primitive, or a sugar awaiting expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceOp {
    Primitive(OpCode),
    Sugar(SugarOp),
}

impl SurfaceOp {
    /// Recognizes a surface key as an opcode.
    pub fn from_key(key: &str) -> Option<Self> {
        OpCode::from_key(key)
            .map(SurfaceOp::Primitive)
            .or_else(|| SugarOp::from_key(key).map(SurfaceOp::Sugar))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceOp::Primitive(op) => op.as_str(),
            SurfaceOp::Sugar(op) => op.as_str(),
        }
    }

    pub fn is_sugar(self) -> bool {
        matches!(self, SurfaceOp::Sugar(_))
    }

    /// The opcode this node carries after expansion. Sugars rewrite to a
    /// `serial` wrapper, so their path segment is allocated as `serial`.
    pub fn physical(self) -> OpCode {
        match self {
            SurfaceOp::Primitive(op) => op,
            SurfaceOp::Sugar(_) => OpCode::Serial,
        }
    }
}

impl fmt::Display for SurfaceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The universal working unit of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Opcode tag.
    pub op: SurfaceOp,
    /// Static parameters (everything that is not structure or wiring).
    pub params: IndexMap<String, Value>,
    /// Input/output declarations.
    pub wiring: Wiring,
    /// Ordered children; empty for atoms.
    pub children: Vec<Node>,
    /// Assigned during expansion; absent in source.
    pub path: Option<StackPath>,
}

impl Node {
    pub fn new(op: SurfaceOp) -> Self {
        Self {
            op,
            params: IndexMap::new(),
            wiring: Wiring::default(),
            children: Vec::new(),
            path: None,
        }
    }

    /// Looks a parameter up by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// String parameter shortcut.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Integer parameter shortcut.
    pub fn param_int(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(Value::as_int)
    }

    /// Pre-order traversal over the subtree.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Node)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Allocates `{opcode}_{index}` path segments for the children of one
/// parent. The index counts earlier siblings of the *same* opcode, so
/// `serial: [worker, parallel, worker]` yields `worker_0`, `parallel_0`,
/// `worker_1`. Allocation depends only on tree shape; parameter values
/// (agent names included) never perturb identity.
#[derive(Debug, Default)]
pub struct PathAllocator {
    counters: HashMap<&'static str, usize>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next path for a child of `parent` carrying opcode `op`.
    pub fn next(&mut self, parent: &StackPath, op: OpCode) -> StackPath {
        let counter = self.counters.entry(op.as_str()).or_insert(0);
        let index = *counter;
        *counter += 1;
        parent.child(op.as_str(), index)
    }
}

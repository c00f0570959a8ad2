//! The primitive instruction set shared by compiler and kernel.
//!
//! A compiled tree contains only these opcodes; the compiler's sugar
//! surface (`generate_team`, `approval_gate`, `ensemble`, `fan_out`)
//! never reaches the IR. Each opcode belongs to one of three behavioural
//! families ([`NodeKind`]):
//!
//! - **Action** - leaves that delegate work outward and wait
//! - **Control** - containers that schedule their children
//! - **Logic** - internal bookkeeping that completes immediately

use std::fmt;

use serde::{Deserialize, Serialize};

/// Behavioural family of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Externally-delegated unit (worker, dialogue, approver).
    Action,
    /// Container scheduling children (serial, parallel, loop, iterate).
    Control,
    /// Immediate internal computation (scope_resolve, iterator_init).
    Logic,
}

/// Instruction code of a compiled ODL node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    /// Invokes an agent to produce an artifact.
    Worker,
    /// Multi-party exchange.
    Dialogue,
    /// Blocks on external approval of a target artifact.
    Approver,
    /// Children run in declaration order; sibling scope grows left-to-right.
    Serial,
    /// Children run concurrently; arms are mutually invisible.
    Parallel,
    /// Repeats its body up to `count` iterations.
    Loop,
    /// Expands its body over a source list at runtime.
    Iterate,
    /// Elects the winning output among loop iterations.
    ScopeResolve,
    /// Materializes the source list reference for an `iterate`.
    IteratorInit,
}

impl OpCode {
    /// All primitive opcodes, in a fixed order.
    pub const ALL: [OpCode; 9] = [
        OpCode::Worker,
        OpCode::Dialogue,
        OpCode::Approver,
        OpCode::Serial,
        OpCode::Parallel,
        OpCode::Loop,
        OpCode::Iterate,
        OpCode::ScopeResolve,
        OpCode::IteratorInit,
    ];

    /// The surface key for this opcode.
    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Worker => "worker",
            OpCode::Dialogue => "dialogue",
            OpCode::Approver => "approver",
            OpCode::Serial => "serial",
            OpCode::Parallel => "parallel",
            OpCode::Loop => "loop",
            OpCode::Iterate => "iterate",
            OpCode::ScopeResolve => "scope_resolve",
            OpCode::IteratorInit => "iterator_init",
        }
    }

    /// Look an opcode up by its surface key.
    pub fn from_key(key: &str) -> Option<Self> {
        OpCode::ALL.iter().copied().find(|op| op.as_str() == key)
    }

    /// Behavioural family of this opcode.
    pub fn kind(self) -> NodeKind {
        match self {
            OpCode::Worker | OpCode::Dialogue | OpCode::Approver => NodeKind::Action,
            OpCode::Serial | OpCode::Parallel | OpCode::Loop | OpCode::Iterate => NodeKind::Control,
            OpCode::ScopeResolve | OpCode::IteratorInit => NodeKind::Logic,
        }
    }

    /// True for leaves: actions and logic nodes carry no children.
    pub fn is_atom(self) -> bool {
        self.kind() != NodeKind::Control
    }

    /// True for containers, which require at least one child.
    pub fn is_control(self) -> bool {
        self.kind() == NodeKind::Control
    }

    /// True for containers whose children execute one after another.
    ///
    /// Sibling visibility (older siblings see earlier outputs) only holds
    /// under sequential containers; `parallel` arms are concurrent.
    pub fn is_sequential_container(self) -> bool {
        matches!(self, OpCode::Serial | OpCode::Loop | OpCode::Iterate)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution mode injected into synthesized workers by the compiler.
///
/// Part of the System layer of the briefing merge; user briefing keys
/// cannot override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    Generate,
    Validate,
    Consolidate,
    Approve,
}

impl WorkerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerMode::Generate => "generate",
            WorkerMode::Validate => "validate",
            WorkerMode::Consolidate => "consolidate",
            WorkerMode::Approve => "approve",
        }
    }
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_key(op.as_str()), Some(op));
        }
        assert_eq!(OpCode::from_key("generate_team"), None);
        assert_eq!(OpCode::from_key("fan_out"), None);
    }

    #[test]
    fn test_kind_partition() {
        assert_eq!(OpCode::Worker.kind(), NodeKind::Action);
        assert_eq!(OpCode::Approver.kind(), NodeKind::Action);
        assert_eq!(OpCode::Loop.kind(), NodeKind::Control);
        assert_eq!(OpCode::IteratorInit.kind(), NodeKind::Logic);
        assert!(OpCode::ScopeResolve.is_atom());
        assert!(!OpCode::Parallel.is_atom());
    }

    #[test]
    fn test_sequential_containers() {
        assert!(OpCode::Serial.is_sequential_container());
        assert!(OpCode::Loop.is_sequential_container());
        assert!(OpCode::Iterate.is_sequential_container());
        assert!(!OpCode::Parallel.is_sequential_container());
        assert!(!OpCode::Worker.is_sequential_container());
    }

    #[test]
    fn test_serde_snake_case() {
        let yaml = serde_yaml::to_string(&OpCode::ScopeResolve).unwrap();
        assert_eq!(yaml.trim(), "scope_resolve");
        let back: OpCode = serde_yaml::from_str("iterator_init").unwrap();
        assert_eq!(back, OpCode::IteratorInit);
    }
}

//! Expand stage: sugar rewriting and path assignment.
//!
//! Rewrites each sugar opcode into its primitive subtree and stamps every
//! node with its [`StackPath`]. Rewrites are local: a sugar becomes a
//! `serial` wrapper in place, taking over the sugar's position (and
//! therefore its path), with the synthesized primitives below it. Nested
//! sugars compose because user content inside a rewrite is expanded
//! recursively after the outer rewrite has placed it.
//!
//! Path assignment is driven by the parent: each child receives
//! `{parent}/{opcode}_{index}` where the index counts earlier siblings of
//! the same opcode ([`PathAllocator`]). Since a sugar's wrapper is a
//! `serial`, its segment is allocated as `serial` - identity depends on
//! the expanded shape, never on what the shape was written as. Paths are
//! assigned exactly once and never revisited.

mod briefing;
mod sugar;

pub use briefing::merge as merge_briefing;

use odl_types::{OpCode, StackPath, Value, WorkerMode};

use crate::ast::{Node, PathAllocator, SugarOp, SurfaceOp};
use crate::error::CompileError;

/// Expands the parsed tree into primitives, assigning stack paths.
///
/// The source root always lands at path `root`.
pub fn expand(root: Node) -> Result<Node, CompileError> {
    expand_node(root, StackPath::root())
}

/// Expands one node, placing it at `path`.
pub(crate) fn expand_node(mut node: Node, path: StackPath) -> Result<Node, CompileError> {
    match node.op {
        SurfaceOp::Sugar(SugarOp::GenerateTeam) => sugar::generate_team(node, path),
        SurfaceOp::Sugar(SugarOp::ApprovalGate) => sugar::approval_gate(node, path),
        SurfaceOp::Sugar(SugarOp::Ensemble) => sugar::ensemble(node, path),
        SurfaceOp::Sugar(SugarOp::FanOut) => sugar::fan_out(node, path),
        SurfaceOp::Primitive(op) => {
            if op == OpCode::Worker && !node.params.contains_key("mode") {
                node.params.insert(
                    "mode".to_string(),
                    Value::from(WorkerMode::Generate.as_str()),
                );
            }
            if op == OpCode::IteratorInit && node.wiring.inputs.is_empty() {
                if let Some(source) = node.param_str("source") {
                    node.wiring.inputs = vec![source.to_string()];
                }
            }
            node.children = expand_children(std::mem::take(&mut node.children), &path)?;
            node.path = Some(path);
            Ok(node)
        }
    }
}

/// Expands a child list under `parent`, allocating sibling paths.
pub(crate) fn expand_children(
    children: Vec<Node>,
    parent: &StackPath,
) -> Result<Vec<Node>, CompileError> {
    let mut alloc = PathAllocator::new();
    children
        .into_iter()
        .map(|child| {
            let path = alloc.next(parent, child.op.physical());
            expand_node(child, path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use odl_types::Value;

    fn expand_yaml(source: &str) -> Node {
        let value: Value = serde_yaml::from_str(source).unwrap();
        expand(parse::parse(&value).expect("parse")).expect("expand")
    }

    fn paths(node: &Node) -> Vec<String> {
        let mut out = vec![node.path.as_ref().unwrap().to_string()];
        for child in &node.children {
            out.extend(paths(child));
        }
        out
    }

    #[test]
    fn test_plain_tree_paths() {
        let tree = expand_yaml(
            "serial:\n  - worker: {agent: A, output: X}\n  - parallel:\n      - worker: {agent: B, output: Y}\n      - worker: {agent: C, output: Z}\n  - worker: {agent: D, inputs: [X], output: W}\n",
        );
        assert_eq!(
            paths(&tree),
            [
                "root",
                "root/worker_0",
                "root/parallel_0",
                "root/parallel_0/worker_0",
                "root/parallel_0/worker_1",
                "root/worker_1",
            ]
        );
    }

    #[test]
    fn test_worker_gets_default_mode() {
        let tree = expand_yaml("worker: {agent: A, output: X}\n");
        assert_eq!(tree.param_str("mode"), Some("generate"));

        let tree = expand_yaml("worker: {agent: A, output: X, mode: validate}\n");
        assert_eq!(tree.param_str("mode"), Some("validate"));
    }

    #[test]
    fn test_paths_are_unique() {
        let tree = expand_yaml(
            "serial:\n  - generate_team: {generator: D, validators: [R, S], loop: 2, inputs: [Spec], output: Draft}\n  - ensemble: {generators: [A, B], samples: 2, consolidator: C, inputs: [Draft], output: Plan}\n",
        );
        let mut seen = std::collections::HashSet::new();
        for path in paths(&tree) {
            assert!(seen.insert(path.clone()), "duplicate path {path}");
        }
    }

    #[test]
    fn test_no_sugar_survives() {
        let tree = expand_yaml(
            "approval_gate:\n  approver: Boss\n  target: Plan\n  contents:\n    - ensemble: {generators: [A, B], samples: 1, consolidator: C, output: Plan}\n",
        );
        fn assert_primitive(node: &Node) {
            assert!(!node.op.is_sugar(), "sugar survived at {:?}", node.path);
            node.children.iter().for_each(assert_primitive);
        }
        assert_primitive(&tree);
    }

    #[test]
    fn test_rename_does_not_perturb_identity() {
        let a = expand_yaml(
            "generate_team: {generator: Alice, validators: [Bob], loop: 2, inputs: [Spec], output: Draft}\n",
        );
        let b = expand_yaml(
            "generate_team: {generator: Carol, validators: [Dave], loop: 2, inputs: [Spec], output: Draft}\n",
        );
        assert_eq!(paths(&a), paths(&b));
    }
}

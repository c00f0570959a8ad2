//! Flattened view of the expanded tree and the visibility rules.
//!
//! Resolution needs to look sideways and upward from a consumer, which a
//! recursive tree walk does poorly. [`TreeIndex`] flattens the tree into
//! document (pre-order) order with parent links and child-position
//! trails, and answers the two questions the resolver asks:
//!
//! - is a candidate producer *visible* from a consumer, and how near?
//! - are two producers *sequentially ordered*, or concurrent?
//!
//! The visibility rule: a consumer sees its older siblings (and their
//! subtrees), its ancestors, and the older siblings of each ancestor
//! (with their subtrees) - provided the branching container schedules its
//! children in sequence. Arms of a `parallel` are mutually invisible,
//! which makes cousins invisible too. Younger siblings are never visible.

use std::collections::HashMap;

use odl_types::{OpCode, StackPath};

use crate::ast::{Node, SurfaceOp};
use crate::error::{CompileError, ErrorKind};

/// One flattened node.
pub(crate) struct Meta {
    pub path: StackPath,
    pub op: OpCode,
    pub parent: Option<usize>,
    /// Child positions from the root; empty at the root. Lexicographic
    /// order over trails is document order.
    pub trail: Vec<usize>,
    /// Declared logical output, if any.
    pub output: Option<String>,
    /// For `iterate`: whether its strategy is serial.
    pub serial_strategy: bool,
}

/// Flattened tree in document order, with producer and path tables.
pub(crate) struct TreeIndex {
    pub nodes: Vec<Meta>,
    pub by_path: HashMap<StackPath, usize>,
    /// Logical name -> producers, in document order.
    pub producers: HashMap<String, Vec<usize>>,
}

/// How near a visible producer sits, for scope election.
///
/// `level` counts how far the consumer climbs before the producer comes
/// into view (own older siblings = 0, parent and its older siblings = 1,
/// ...). At equal level, a sibling-subtree producer beats the ancestor
/// itself. Derived `Ord` compares `(level, ancestor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Placement {
    pub level: usize,
    pub ancestor: bool,
}

impl TreeIndex {
    /// Flattens an expanded tree. Fails if a sugar opcode or an unpathed
    /// node survived expansion - both are compiler bugs.
    pub fn build(root: &Node) -> Result<Self, CompileError> {
        let mut index = TreeIndex {
            nodes: Vec::new(),
            by_path: HashMap::new(),
            producers: HashMap::new(),
        };
        index.push_subtree(root, None, Vec::new())?;
        Ok(index)
    }

    fn push_subtree(
        &mut self,
        node: &Node,
        parent: Option<usize>,
        trail: Vec<usize>,
    ) -> Result<(), CompileError> {
        let op = match node.op {
            SurfaceOp::Primitive(op) => op,
            SurfaceOp::Sugar(sugar) => {
                return Err(CompileError::new(
                    ErrorKind::InternalAssemblyError,
                    format!("sugar opcode '{sugar}' survived expansion"),
                ));
            }
        };
        let Some(path) = node.path.clone() else {
            return Err(CompileError::new(
                ErrorKind::InternalAssemblyError,
                format!("node '{op}' has no stack path after expansion"),
            ));
        };

        let idx = self.nodes.len();
        self.nodes.push(Meta {
            path: path.clone(),
            op,
            parent,
            trail: trail.clone(),
            output: node.wiring.output.clone(),
            serial_strategy: op == OpCode::Iterate
                && node.param_str("strategy") != Some("parallel"),
        });
        self.by_path.insert(path, idx);
        if let Some(output) = &node.wiring.output {
            self.producers.entry(output.clone()).or_default().push(idx);
        }

        for (pos, child) in node.children.iter().enumerate() {
            let mut child_trail = trail.clone();
            child_trail.push(pos);
            self.push_subtree(child, Some(idx), child_trail)?;
        }
        Ok(())
    }

    fn depth(&self, idx: usize) -> usize {
        self.nodes[idx].trail.len()
    }

    /// True if `a` is a proper ancestor of `b`.
    pub fn is_ancestor(&self, a: usize, b: usize) -> bool {
        let (ta, tb) = (&self.nodes[a].trail, &self.nodes[b].trail);
        tb.len() > ta.len() && tb.starts_with(ta)
    }

    /// Lowest common ancestor of two nodes.
    fn lca(&self, a: usize, b: usize) -> usize {
        let (ta, tb) = (&self.nodes[a].trail, &self.nodes[b].trail);
        let common = ta
            .iter()
            .zip(tb.iter())
            .take_while(|(x, y)| x == y)
            .count();
        // Climb from a to the node whose trail length equals `common`.
        let mut idx = a;
        while self.depth(idx) > common {
            idx = match self.nodes[idx].parent {
                Some(parent) => parent,
                None => return idx,
            };
        }
        idx
    }

    /// Visibility of `candidate` from `consumer`, per the scope rules.
    /// `None` means invisible (younger sibling, parallel cousin, self).
    pub fn placement(&self, consumer: usize, candidate: usize) -> Option<Placement> {
        if candidate == consumer {
            return None;
        }
        if self.is_ancestor(candidate, consumer) {
            return Some(Placement {
                level: self.depth(consumer) - self.depth(candidate),
                ancestor: true,
            });
        }
        if self.is_ancestor(consumer, candidate) {
            // A consumer never sees into its own (unfinished) subtree.
            return None;
        }
        let lca = self.lca(consumer, candidate);
        if !self.nodes[lca].op.is_sequential_container() {
            return None;
        }
        let branch = self.depth(lca);
        let consumer_pos = self.nodes[consumer].trail[branch];
        let candidate_pos = self.nodes[candidate].trail[branch];
        if candidate_pos >= consumer_pos {
            return None;
        }
        Some(Placement {
            level: self.depth(consumer) - branch - 1,
            ancestor: false,
        })
    }

    /// True if the two nodes run one after the other: one contains the
    /// other, or they branch at a sequential container. Producers that
    /// branch at a `parallel` are concurrent and carry no usable order.
    pub fn sequentially_ordered(&self, a: usize, b: usize) -> bool {
        if self.is_ancestor(a, b) || self.is_ancestor(b, a) {
            return true;
        }
        self.nodes[self.lca(a, b)].op.is_sequential_container()
    }

    /// Iteration contexts enclosing `idx`, nearest first: every `loop`,
    /// plus every `iterate` running its items serially.
    pub fn iteration_contexts(&self, idx: usize) -> Vec<usize> {
        let mut contexts = Vec::new();
        let mut cursor = self.nodes[idx].parent;
        while let Some(current) = cursor {
            let meta = &self.nodes[current];
            match meta.op {
                OpCode::Loop => contexts.push(current),
                OpCode::Iterate if meta.serial_strategy => contexts.push(current),
                _ => {}
            }
            cursor = meta.parent;
        }
        contexts
    }

    /// True if some ancestor of `idx` carries opcode `op`.
    pub fn has_ancestor_op(&self, idx: usize, op: OpCode) -> bool {
        let mut cursor = self.nodes[idx].parent;
        while let Some(current) = cursor {
            if self.nodes[current].op == op {
                return true;
            }
            cursor = self.nodes[current].parent;
        }
        false
    }

    /// True if `idx` lies in the subtree rooted at `root` (inclusive).
    pub fn in_subtree(&self, root: usize, idx: usize) -> bool {
        root == idx || self.is_ancestor(root, idx)
    }

    /// The nearest `loop`/`iterate` ancestor of `producer` that does not
    /// also enclose `consumer`, if any. A producer behind such a boundary
    /// is iteration-ambiguous from the consumer's point of view.
    pub fn iteration_boundary(&self, producer: usize, consumer: usize) -> Option<usize> {
        let mut cursor = self.nodes[producer].parent;
        while let Some(current) = cursor {
            let meta = &self.nodes[current];
            if matches!(meta.op, OpCode::Loop | OpCode::Iterate) && !self.in_subtree(current, consumer)
            {
                return Some(current);
            }
            cursor = meta.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use crate::parse;
    use odl_types::Value;

    fn index_of(source: &str) -> TreeIndex {
        let value: Value = serde_yaml::from_str(source).unwrap();
        let tree = expand(parse::parse(&value).expect("parse")).expect("expand");
        TreeIndex::build(&tree).expect("index")
    }

    fn idx(index: &TreeIndex, path: &str) -> usize {
        index.by_path[&StackPath::parse(path)]
    }

    #[test]
    fn test_older_sibling_visible() {
        let index = index_of(
            "serial:\n  - worker: {agent: A, output: X}\n  - worker: {agent: B, inputs: [X], output: Y}\n",
        );
        let producer = idx(&index, "root/worker_0");
        let consumer = idx(&index, "root/worker_1");
        assert_eq!(
            index.placement(consumer, producer),
            Some(Placement { level: 0, ancestor: false })
        );
        // Never the other way around.
        assert_eq!(index.placement(producer, consumer), None);
    }

    #[test]
    fn test_parallel_arms_invisible() {
        let index = index_of(
            "parallel:\n  - worker: {agent: A, output: X}\n  - worker: {agent: B, inputs: [X], output: Y}\n",
        );
        let producer = idx(&index, "root/worker_0");
        let consumer = idx(&index, "root/worker_1");
        assert_eq!(index.placement(consumer, producer), None);
        assert!(!index.sequentially_ordered(producer, consumer));
    }

    #[test]
    fn test_uncle_subtree_visible_at_level_one() {
        let index = index_of(
            "serial:\n  - parallel:\n      - worker: {agent: A, output: X}\n      - worker: {agent: B, output: Y}\n  - serial:\n      - worker: {agent: C, inputs: [X], output: Z}\n",
        );
        let producer = idx(&index, "root/parallel_0/worker_0");
        let consumer = idx(&index, "root/serial_0/worker_0");
        assert_eq!(
            index.placement(consumer, producer),
            Some(Placement { level: 1, ancestor: false })
        );
    }

    #[test]
    fn test_ancestor_visible_sibling_preferred() {
        let index = index_of(
            "serial:\n  - worker: {agent: A, output: X}\n  - worker: {agent: B, inputs: [X], output: Y}\n",
        );
        let root = idx(&index, "root");
        let consumer = idx(&index, "root/worker_1");
        let ancestor_placement = index.placement(consumer, root).unwrap();
        let sibling_placement = index
            .placement(consumer, idx(&index, "root/worker_0"))
            .unwrap();
        assert!(sibling_placement < ancestor_placement);
        assert!(ancestor_placement.ancestor);
    }

    #[test]
    fn test_iteration_boundary() {
        let index = index_of(
            "serial:\n  - loop:\n      count: 2\n      contents:\n        worker: {agent: A, output: X}\n  - worker: {agent: B, inputs: [X], output: Y}\n",
        );
        let producer = idx(&index, "root/loop_0/worker_0");
        let consumer = idx(&index, "root/worker_0");
        assert_eq!(
            index.iteration_boundary(producer, consumer),
            Some(idx(&index, "root/loop_0"))
        );
        // From inside the loop there is no boundary.
        let inner_consumer = producer;
        assert_eq!(index.iteration_boundary(producer, inner_consumer), None);
    }

    #[test]
    fn test_iteration_contexts_nearest_first() {
        let index = index_of(
            "loop:\n  count: 2\n  contents:\n    loop:\n      count: 3\n      contents:\n        worker: {agent: A, output: X}\n",
        );
        let worker = idx(&index, "root/loop_0/worker_0");
        let contexts = index.iteration_contexts(worker);
        assert_eq!(contexts.len(), 2);
        assert_eq!(index.nodes[contexts[0]].path.to_string(), "root/loop_0");
        assert_eq!(index.nodes[contexts[1]].path.to_string(), "root");
    }
}

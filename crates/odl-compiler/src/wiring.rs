//! Wiring stage: structural defense over the resolved graph.
//!
//! By the time this pass runs, the resolver has bound every internal
//! input to a producer path under visibility rules that make forward
//! references impossible. This pass re-verifies the result rather than
//! trusting it:
//!
//! - every `Name#path` input must reference a real node
//! - stack paths must be unique across the tree
//! - a producer that is an *ancestor* of its consumer is a containment
//!   cycle (the container cannot complete before its own child)
//! - the producer->consumer graph must be acyclic; depth-first search
//!   with a recursion stack reports the cycle path on a back-edge
//!
//! `@prev`/`@history` edges are time-shifted across iterations and are
//! excluded from the cycle graph. Producers nobody consumes are terminal
//! outputs - legal IR, surfaced as a warning only.
//!
//! Unlike Syntax and Resolve, this stage fails fast.

use std::collections::{HashMap, HashSet};

use odl_types::{name, StackPath};
use tracing::warn;

use crate::ast::Node;
use crate::error::{CompileError, ErrorKind};

/// Validates the resolved tree's wiring.
pub fn validate(root: &Node) -> Result<(), CompileError> {
    let mut entries = Vec::new();
    collect(root, &mut entries)?;

    let mut by_path: HashMap<&StackPath, usize> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        if by_path.insert(&entry.path, idx).is_some() {
            return Err(CompileError::at(
                ErrorKind::DuplicatePath,
                entry.path.clone(),
                format!("stack path '{}' is assigned twice", entry.path),
            ));
        }
    }

    // Producer -> consumers, over same-iteration edges only.
    let mut edges: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut consumed: HashSet<usize> = HashSet::new();
    for (consumer_idx, entry) in entries.iter().enumerate() {
        for input in &entry.inputs {
            // External and symbolic inputs carry no node reference.
            if input.contains(':') || name::is_dynamic(input) {
                continue;
            }
            let Some(reference) = parse_internal(input) else {
                return Err(CompileError::at(
                    ErrorKind::UndefinedReference,
                    entry.path.clone(),
                    format!("input '{input}' was never bound to a producer"),
                ));
            };
            let Some(&producer_idx) = by_path.get(&reference.producer) else {
                return Err(CompileError::at(
                    ErrorKind::UndefinedReference,
                    entry.path.clone(),
                    format!("input '{input}' references nonexistent node '{}'", reference.producer),
                ));
            };
            consumed.insert(producer_idx);
            if reference.time_shifted {
                continue;
            }
            if entries[producer_idx].path.is_ancestor_of(&entry.path) {
                return Err(CompileError::at(
                    ErrorKind::CircularDependency,
                    entry.path.clone(),
                    format!(
                        "cycle: '{}' consumes '{input}' produced by its own container",
                        entry.path
                    ),
                ));
            }
            edges.entry(producer_idx).or_default().push(consumer_idx);
        }
    }

    // Cycle detection over the data-flow graph.
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    for start in 0..entries.len() {
        if !visited.contains(&start) {
            if let Some(cycle) =
                cycle_dfs(start, &edges, &mut visited, &mut rec_stack, Vec::new())
            {
                let chain = cycle
                    .iter()
                    .map(|&i| entries[i].path.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(CompileError::at(
                    ErrorKind::CircularDependency,
                    entries[cycle[0]].path.clone(),
                    format!("circular dependency: {chain}"),
                ));
            }
        }
    }

    // Terminal outputs are consumed externally; mention them, don't fail.
    for (idx, entry) in entries.iter().enumerate() {
        if idx > 0 && entry.output.is_some() && !consumed.contains(&idx) {
            warn!(
                path = %entry.path,
                output = entry.output.as_deref().unwrap_or_default(),
                "output has no internal consumer; treating as terminal"
            );
        }
    }

    Ok(())
}

struct Entry {
    path: StackPath,
    inputs: Vec<String>,
    output: Option<String>,
}

fn collect(node: &Node, entries: &mut Vec<Entry>) -> Result<(), CompileError> {
    let Some(path) = node.path.clone() else {
        return Err(CompileError::new(
            ErrorKind::InternalAssemblyError,
            format!("node '{}' reached wiring validation without a path", node.op),
        ));
    };
    entries.push(Entry {
        path,
        inputs: node.wiring.inputs.clone(),
        output: node.wiring.output.clone(),
    });
    for child in &node.children {
        collect(child, entries)?;
    }
    Ok(())
}

struct InternalRef {
    producer: StackPath,
    time_shifted: bool,
}

/// Parses a resolved internal reference (`Name#path[@modifier]`).
fn parse_internal(input: &str) -> Option<InternalRef> {
    let (_, reference) = input.split_once('#')?;
    let (path, modifier) = name::split_modifier(reference);
    Some(InternalRef {
        producer: StackPath::parse(path),
        time_shifted: modifier.is_some(),
    })
}

fn cycle_dfs(
    current: usize,
    edges: &HashMap<usize, Vec<usize>>,
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    mut path: Vec<usize>,
) -> Option<Vec<usize>> {
    visited.insert(current);
    rec_stack.insert(current);
    path.push(current);

    if let Some(next) = edges.get(&current) {
        for &dep in next {
            if !visited.contains(&dep) {
                if let Some(cycle) = cycle_dfs(dep, edges, visited, rec_stack, path.clone()) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&dep) {
                let start = path.iter().position(|&p| p == dep)?;
                let mut cycle = path[start..].to_vec();
                cycle.push(dep);
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(&current);
    None
}

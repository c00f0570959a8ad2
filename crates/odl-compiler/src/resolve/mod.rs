//! Resolve stage: binds logical names to physical producers.
//!
//! For every input of every node, determines the unique producer under
//! the visibility rules and rewrites the input as `Name#stack_path`.
//! External references become `Name:ResourceID@Version` (version
//! defaulting to `stable`). Iteration modifiers survive resolution -
//! `Report@history` becomes `Report#path@history` - because the kernel,
//! not the compiler, materializes per-iteration instances.
//!
//! Producer election, when several are visible:
//!
//! 1. the nearest scope wins (own older siblings, then each ancestor
//!    level outward; sibling subtrees beat the ancestor itself)
//! 2. within that scope, the latest producer in document order wins -
//!    but only sequentially ordered producers are comparable; concurrent
//!    producers (branching at a `parallel`) are ambiguous
//! 3. a producer behind a `loop`/`iterate` boundary is
//!    iteration-ambiguous; only a `scope_resolve` mediator may read
//!    across it, and when one exists it is itself the later producer
//!
//! Dynamic variables (`$LOOP`, `$KEY`, `$ITEM`, `$PREV`, `$HISTORY`) are
//! checked against their binding context and left symbolic, both in
//! inputs and embedded in param strings (briefing interpolation).
//!
//! Like the syntax stage, this pass collects every error before
//! returning.

mod visibility;

use odl_types::{name, ArtifactClass, InputModifier, OpCode, Value};

use crate::ast::Node;
use crate::error::{CompileError, ErrorKind};
use visibility::TreeIndex;

/// Resolves all wiring in an expanded tree.
pub fn resolve(mut root: Node) -> Result<Node, Vec<CompileError>> {
    let index = TreeIndex::build(&root).map_err(|e| vec![e])?;
    let mut resolver = Resolver {
        index: &index,
        errors: Vec::new(),
    };
    resolver.resolve_node(&mut root);
    if resolver.errors.is_empty() {
        Ok(root)
    } else {
        Err(resolver.errors)
    }
}

struct Resolver<'a> {
    index: &'a TreeIndex,
    errors: Vec<CompileError>,
}

impl Resolver<'_> {
    fn resolve_node(&mut self, node: &mut Node) {
        if let Some(consumer) = node
            .path
            .as_ref()
            .and_then(|path| self.index.by_path.get(path))
            .copied()
        {
            let inputs = std::mem::take(&mut node.wiring.inputs);
            node.wiring.inputs = inputs
                .into_iter()
                .map(|input| match self.resolve_input(consumer, &input) {
                    Ok(resolved) => resolved,
                    Err(error) => {
                        self.errors.push(error);
                        input
                    }
                })
                .collect();

            for value in node.params.values() {
                self.check_params_tokens(consumer, value);
            }
        } else {
            self.errors.push(CompileError::new(
                ErrorKind::InternalAssemblyError,
                format!("node '{}' is missing from the path index", node.op),
            ));
        }

        for child in &mut node.children {
            self.resolve_node(child);
        }
    }

    fn resolve_input(&self, consumer: usize, input: &str) -> Result<String, CompileError> {
        // Already-bound references pass through; the wiring checker
        // re-verifies them.
        if input.contains('#') {
            return Ok(input.to_string());
        }
        if name::is_dynamic(input) {
            self.check_dynamic_tokens(consumer, input)?;
            return Ok(input.to_string());
        }

        let (base, modifier) = name::split_modifier(input);
        if let ArtifactClass::Project(project) = name::classify(base) {
            if modifier.is_some() {
                return Err(self.error_at(
                    ErrorKind::InvalidModifier,
                    consumer,
                    format!("'{input}': project documents have no iteration history"),
                ));
            }
            return Ok(project.to_string());
        }

        match modifier {
            Some(modifier) => self.resolve_modified(consumer, base, modifier),
            None => {
                let producer = self.elect_producer(consumer, base)?;
                Ok(format!("{base}#{}", self.index.nodes[producer].path))
            }
        }
    }

    /// Resolves `Name@prev` / `Name@history`: the producer must live in
    /// the body of an enclosing loop (or serial iterate), searching
    /// nearest context first. The producer may be the consumer itself,
    /// and may even be a younger sibling - the reference is to a
    /// *previous* iteration, which ran to completion.
    fn resolve_modified(
        &self,
        consumer: usize,
        base: &str,
        modifier: InputModifier,
    ) -> Result<String, CompileError> {
        let contexts = self.index.iteration_contexts(consumer);
        if contexts.is_empty() {
            return Err(self.error_at(
                ErrorKind::InvalidModifier,
                consumer,
                format!(
                    "'{base}{modifier}': modifiers are only valid inside a loop or a serial iterate"
                ),
            ));
        }

        for context in contexts {
            let candidates: Vec<usize> = self
                .index
                .producers
                .get(base)
                .map(|producers| {
                    producers
                        .iter()
                        .copied()
                        .filter(|&p| self.index.in_subtree(context, p))
                        .collect()
                })
                .unwrap_or_default();
            if candidates.is_empty() {
                continue;
            }
            let winner = self.latest_of(consumer, base, &candidates)?;
            return Ok(format!(
                "{base}#{}{}",
                self.index.nodes[winner].path,
                modifier.as_suffix()
            ));
        }

        Err(self.error_at(
            ErrorKind::UndefinedReference,
            consumer,
            format!("'{base}{modifier}': no producer of '{base}' in any enclosing iteration body"),
        ))
    }

    /// Elects the producer of `base` visible from `consumer`.
    fn elect_producer(&self, consumer: usize, base: &str) -> Result<usize, CompileError> {
        let mut visible: Vec<(visibility::Placement, usize)> = self
            .index
            .producers
            .get(base)
            .map(|producers| {
                producers
                    .iter()
                    .filter_map(|&p| self.index.placement(consumer, p).map(|pl| (pl, p)))
                    .collect()
            })
            .unwrap_or_default();

        if visible.is_empty() {
            return Err(self
                .error_at(
                    ErrorKind::UndefinedReference,
                    consumer,
                    format!("input '{base}' names no visible producer"),
                )
                .with_note(
                    "the artifact may be undefined, or declared by a younger sibling or a \
                     parallel cousin",
                ));
        }

        let nearest = visible.iter().map(|(pl, _)| *pl).min().unwrap_or_else(|| {
            // Non-empty by the check above.
            visibility::Placement {
                level: 0,
                ancestor: false,
            }
        });
        let group: Vec<usize> = visible
            .drain(..)
            .filter(|(pl, _)| *pl == nearest)
            .map(|(_, p)| p)
            .collect();
        let winner = self.latest_of(consumer, base, &group)?;

        // Reading across a loop boundary has no single-iteration answer;
        // only the mediator inserted at expansion may do it.
        if self.index.nodes[consumer].op != OpCode::ScopeResolve {
            if let Some(boundary) = self.index.iteration_boundary(winner, consumer) {
                return Err(self
                    .error_at(
                        ErrorKind::AmbiguousProducer,
                        consumer,
                        format!(
                            "'{base}' is produced across iterations of '{}'",
                            self.index.nodes[boundary].path
                        ),
                    )
                    .with_note(
                        "artifacts leave a loop only through a scope_resolve mediator",
                    ));
            }
        }
        Ok(winner)
    }

    /// The latest of a candidate group in document order. Only
    /// sequentially ordered candidates are comparable; concurrent ones
    /// make the reference ambiguous.
    fn latest_of(
        &self,
        consumer: usize,
        base: &str,
        group: &[usize],
    ) -> Result<usize, CompileError> {
        let mut winner = group[0];
        for &candidate in &group[1..] {
            if !self.index.sequentially_ordered(winner, candidate) {
                let mut paths: Vec<String> = group
                    .iter()
                    .map(|&p| self.index.nodes[p].path.to_string())
                    .collect();
                paths.sort();
                return Err(self
                    .error_at(
                        ErrorKind::AmbiguousProducer,
                        consumer,
                        format!("multiple concurrent producers of '{base}'"),
                    )
                    .with_note(format!("candidates: {}", paths.join(", "))));
            }
            if candidate > winner {
                winner = candidate;
            }
        }
        Ok(winner)
    }

    // --- dynamic variables ---

    fn check_params_tokens(&mut self, consumer: usize, value: &Value) {
        match value {
            Value::String(s) if name::is_dynamic(s) => {
                if let Err(error) = self.check_dynamic_tokens(consumer, s) {
                    self.errors.push(error);
                }
            }
            Value::List(items) => {
                for item in items {
                    self.check_params_tokens(consumer, item);
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    self.check_params_tokens(consumer, item);
                }
            }
            _ => {}
        }
    }

    /// Validates that every `$VAR` embedded in `text` is bound by an
    /// enclosing context: `loop` binds `$LOOP`/`$PREV`/`$HISTORY`,
    /// `iterate` binds `$KEY`/`$ITEM`. The token itself stays symbolic.
    fn check_dynamic_tokens(&self, consumer: usize, text: &str) -> Result<(), CompileError> {
        for token in dynamic_tokens(text) {
            let bound = match token {
                "LOOP" | "PREV" | "HISTORY" => {
                    self.index.has_ancestor_op(consumer, OpCode::Loop)
                }
                "KEY" | "ITEM" => self.index.has_ancestor_op(consumer, OpCode::Iterate),
                _ => {
                    return Err(self.error_at(
                        ErrorKind::UnboundDynamicVariable,
                        consumer,
                        format!("unknown dynamic variable '${token}' in '{text}'"),
                    ));
                }
            };
            if !bound {
                return Err(self.error_at(
                    ErrorKind::UnboundDynamicVariable,
                    consumer,
                    format!("'${token}' is not bound in this context ('{text}')"),
                ));
            }
        }
        Ok(())
    }

    fn error_at(&self, kind: ErrorKind, consumer: usize, message: String) -> CompileError {
        CompileError::at(kind, self.index.nodes[consumer].path.clone(), message)
    }
}

/// Extracts `$VAR` token names from a string.
fn dynamic_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('$').map(|(at, _)| {
        let rest = &text[at + 1..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        &rest[..end]
    })
}

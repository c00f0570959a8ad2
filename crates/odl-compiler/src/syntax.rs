//! Syntax stage: per-opcode schemas and naming rules.
//!
//! Static validation over the parsed tree, before any rewriting. Unlike
//! the parser, this stage collects every violation in the tree and
//! returns a batched report.
//!
//! Checked here:
//!
//! - required parameters and wiring per opcode (the contract table)
//! - child arity: containers need children, `fan_out` needs its template
//! - `fan_out` nesting, at any depth
//! - artifact naming rules on every declared output and input; a Project
//!   Document as an output is an external write attempt
//!
//! Context-dependent rules (modifier placement, dynamic variable binding)
//! belong to the resolver, which knows each consumer's iteration context.

use odl_types::{name, ArtifactClass, OpCode, StackPath, Value};

use crate::ast::{Node, PathAllocator, SugarOp, SurfaceOp};
use crate::error::{CompileError, ErrorKind};

/// Validates the parsed tree, collecting all errors.
pub fn validate(root: &Node) -> Result<(), Vec<CompileError>> {
    let mut checker = Checker { errors: Vec::new() };
    checker.check_node(root, &StackPath::root(), false);
    if checker.errors.is_empty() {
        Ok(())
    } else {
        Err(checker.errors)
    }
}

struct Checker {
    errors: Vec<CompileError>,
}

impl Checker {
    fn check_node(&mut self, node: &Node, trail: &StackPath, in_fan_out: bool) {
        match node.op {
            SurfaceOp::Primitive(op) => self.check_primitive(node, op, trail),
            SurfaceOp::Sugar(op) => self.check_sugar(node, op, trail, in_fan_out),
        }

        if let Some(output) = &node.wiring.output {
            self.check_output_name(output, trail);
        }
        for input in &node.wiring.inputs {
            self.check_input_name(input, trail);
        }
        if let Some(briefing) = node.param("briefing") {
            if briefing.as_map().is_none() {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!("'briefing' must be a mapping, got {}", briefing.type_name()),
                );
            }
        }

        let next_in_fan_out = in_fan_out || node.op == SurfaceOp::Sugar(SugarOp::FanOut);
        let mut alloc = PathAllocator::new();
        for child in &node.children {
            let child_trail = alloc.next(trail, child.op.physical());
            self.check_node(child, &child_trail, next_in_fan_out);
        }
    }

    fn check_primitive(&mut self, node: &Node, op: OpCode, trail: &StackPath) {
        match op {
            OpCode::Worker => {
                self.require_str(node, "agent", trail);
                self.require_output(node, trail);
            }
            OpCode::Dialogue => {
                self.require_str_list(node, "agents", 1, trail);
            }
            OpCode::Approver => {
                self.require_str(node, "agent", trail);
                if let Some(target) = self.require_str(node, "target", trail) {
                    let target = target.to_string();
                    self.check_input_name(&target, trail);
                }
            }
            OpCode::Serial | OpCode::Parallel => {
                self.require_children(node, trail);
            }
            OpCode::Loop => {
                self.require_positive_int(node, "count", trail);
                self.require_children(node, trail);
            }
            OpCode::Iterate => {
                self.require_children(node, trail);
                if node.param("strategy").is_some() {
                    self.require_strategy(node, trail);
                }
            }
            OpCode::ScopeResolve => {
                if let Some(target) = self.require_str(node, "target", trail) {
                    let target = target.to_string();
                    self.check_input_name(&target, trail);
                }
                self.require_str(node, "from_scope", trail);
                self.require_str(node, "strategy", trail);
                self.require_output(node, trail);
            }
            OpCode::IteratorInit => {
                if let Some(source) = self.require_str(node, "source", trail) {
                    let source = source.to_string();
                    self.check_input_name(&source, trail);
                }
                self.require_str(node, "item_key", trail);
            }
        }
    }

    fn check_sugar(&mut self, node: &Node, op: SugarOp, trail: &StackPath, in_fan_out: bool) {
        match op {
            SugarOp::GenerateTeam => {
                self.require_str(node, "generator", trail);
                self.require_str_list(node, "validators", 1, trail);
                self.require_positive_int(node, "loop", trail);
                self.require_output(node, trail);
            }
            SugarOp::ApprovalGate => {
                self.require_str(node, "approver", trail);
                if let Some(target) = self.require_str(node, "target", trail) {
                    let target = target.to_string();
                    self.check_output_name(&target, trail);
                }
                self.require_children(node, trail);
            }
            SugarOp::Ensemble => {
                if let Some(generators) = self.require_str_list(node, "generators", 1, trail) {
                    for (i, agent) in generators.iter().enumerate() {
                        if generators[..i].contains(agent) {
                            self.push(
                                ErrorKind::DuplicateAgent,
                                trail,
                                format!("duplicate generator agent '{agent}' in ensemble"),
                            );
                        }
                    }
                }
                self.require_str(node, "consolidator", trail);
                self.require_positive_int(node, "samples", trail);
                self.require_output(node, trail);
            }
            SugarOp::FanOut => {
                if in_fan_out {
                    self.push(
                        ErrorKind::NestedFanOut,
                        trail,
                        "fan_out cannot be nested within another fan_out",
                    );
                }
                if let Some(source) = self.require_str(node, "source", trail) {
                    let source = source.to_string();
                    self.check_input_name(&source, trail);
                }
                self.require_str(node, "item_key", trail);
                self.require_strategy(node, trail);
                if node.children.len() != 1 {
                    self.push(
                        ErrorKind::MissingRequiredField,
                        trail,
                        format!(
                            "fan_out requires exactly one 'worker' template, found {}",
                            node.children.len()
                        ),
                    );
                }
            }
        }
    }

    // --- field requirements ---

    fn require_str<'a>(&mut self, node: &'a Node, key: &str, trail: &StackPath) -> Option<&'a str> {
        match node.param(key) {
            Some(value) => match value.as_str() {
                Some(s) => Some(s),
                None => {
                    self.push(
                        ErrorKind::MissingRequiredField,
                        trail,
                        format!(
                            "'{}' requires '{key}' to be a string, got {}",
                            node.op,
                            value.type_name()
                        ),
                    );
                    None
                }
            },
            None => {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!("'{}' requires '{key}'", node.op),
                );
                None
            }
        }
    }

    fn require_str_list(
        &mut self,
        node: &Node,
        key: &str,
        min: usize,
        trail: &StackPath,
    ) -> Option<Vec<String>> {
        let Some(value) = node.param(key) else {
            self.push(
                ErrorKind::MissingRequiredField,
                trail,
                format!("'{}' requires '{key}'", node.op),
            );
            return None;
        };
        let Some(items) = value.as_list() else {
            self.push(
                ErrorKind::MissingRequiredField,
                trail,
                format!(
                    "'{}' requires '{key}' to be a list, got {}",
                    node.op,
                    value.type_name()
                ),
            );
            return None;
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(s) => out.push(s.to_string()),
                None => {
                    self.push(
                        ErrorKind::MissingRequiredField,
                        trail,
                        format!(
                            "'{key}' entries must be strings, got {}",
                            item.type_name()
                        ),
                    );
                    return None;
                }
            }
        }
        if out.len() < min {
            self.push(
                ErrorKind::MissingRequiredField,
                trail,
                format!("'{}' requires at least {min} entry in '{key}'", node.op),
            );
            return None;
        }
        Some(out)
    }

    fn require_positive_int(&mut self, node: &Node, key: &str, trail: &StackPath) {
        match node.param(key) {
            Some(Value::Int(n)) if *n >= 1 => {}
            Some(value) => {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!(
                        "'{}' requires '{key}' to be an integer >= 1, got {}",
                        node.op,
                        value.type_name()
                    ),
                );
            }
            None => {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!("'{}' requires '{key}'", node.op),
                );
            }
        }
    }

    fn require_strategy(&mut self, node: &Node, trail: &StackPath) {
        match node.param_str("strategy") {
            Some("serial") | Some("parallel") => {}
            Some(other) => {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!("'strategy' must be 'serial' or 'parallel', got '{other}'"),
                );
            }
            None => {
                self.push(
                    ErrorKind::MissingRequiredField,
                    trail,
                    format!("'{}' requires 'strategy'", node.op),
                );
            }
        }
    }

    fn require_children(&mut self, node: &Node, trail: &StackPath) {
        if node.children.is_empty() {
            self.push(
                ErrorKind::MissingRequiredField,
                trail,
                format!("'{}' requires at least one child", node.op),
            );
        }
    }

    fn require_output(&mut self, node: &Node, trail: &StackPath) {
        if node.wiring.output.is_none() {
            self.push(
                ErrorKind::MissingRequiredField,
                trail,
                format!("'{}' requires 'output'", node.op),
            );
        }
    }

    // --- naming rules ---

    fn check_output_name(&mut self, output: &str, trail: &StackPath) {
        match name::classify(output) {
            ArtifactClass::Job => {}
            ArtifactClass::Project(proj) => {
                self.push(
                    ErrorKind::ExternalWriteAttempt,
                    trail,
                    format!("project document '{proj}' is read-only and cannot be an output"),
                );
            }
            ArtifactClass::Reserved => {
                self.push(
                    ErrorKind::ReservedName,
                    trail,
                    format!("'{output}': names containing '__' are reserved for the system"),
                );
            }
            ArtifactClass::Private => {
                self.push(
                    ErrorKind::PrivateName,
                    trail,
                    format!("'{output}': names starting with '_' are reserved for private artifacts"),
                );
            }
            ArtifactClass::Malformed(reason) => {
                self.push(
                    ErrorKind::MalformedName,
                    trail,
                    format!("'{output}': {reason}"),
                );
            }
        }
    }

    fn check_input_name(&mut self, input: &str, trail: &StackPath) {
        if name::is_dynamic(input) {
            // Binding context is the resolver's concern.
            return;
        }
        let (base, _modifier) = name::split_modifier(input);
        match name::classify(base) {
            ArtifactClass::Job | ArtifactClass::Project(_) => {}
            ArtifactClass::Reserved => {
                self.push(
                    ErrorKind::ReservedName,
                    trail,
                    format!("'{input}': system artifacts ('__') cannot be referenced directly"),
                );
            }
            ArtifactClass::Private => {
                self.push(
                    ErrorKind::PrivateName,
                    trail,
                    format!("'{input}': private artifacts ('_') cannot be referenced directly"),
                );
            }
            ArtifactClass::Malformed(reason) => {
                self.push(
                    ErrorKind::MalformedName,
                    trail,
                    format!("'{input}': {reason}"),
                );
            }
        }
    }

    fn push(&mut self, kind: ErrorKind, trail: &StackPath, message: impl Into<String>) {
        self.errors
            .push(CompileError::at(kind, trail.clone(), message));
    }
}

//! Parse stage: normalizes the raw source tree into [`Node`]s.
//!
//! Each source node is a single-keyed mapping whose key is the opcode and
//! whose body holds its fields. Normalization splits the shorthand
//! surface into the canonical buckets:
//!
//! - `inputs` / `output` move into `wiring`
//! - `contents` (and the already-canonical `children`) recurse into
//!   `children`; a bare list body is the `serial:` / `parallel:` block
//!   shorthand
//! - `fan_out.worker` is the per-item template and becomes the child
//! - everything else stays in `params`
//!
//! Parsing fails fast: the first malformed node or unknown opcode aborts
//! the stage. Errors are addressed by provisional paths computed with the
//! same `{opcode}_{index}` scheme the expander later uses.

use odl_types::{OpCode, StackPath, Value};

use crate::ast::{Node, PathAllocator, SugarOp, SurfaceOp};
use crate::error::{CompileError, ErrorKind};

/// Parses a source tree into the working AST.
pub fn parse(source: &Value) -> Result<Node, CompileError> {
    match source {
        Value::Map(map) if !map.is_empty() => parse_node(source, StackPath::root()),
        Value::Map(_) => Err(CompileError::new(
            ErrorKind::MalformedNode,
            "source document is empty",
        )),
        other => Err(CompileError::new(
            ErrorKind::MalformedNode,
            format!("source root must be a mapping, got {}", other.type_name()),
        )),
    }
}

fn parse_node(value: &Value, trail: StackPath) -> Result<Node, CompileError> {
    let map = match value.as_map() {
        Some(map) => map,
        None => {
            return Err(CompileError::at(
                ErrorKind::MalformedNode,
                trail,
                format!("node must be a mapping, got {}", value.type_name()),
            ));
        }
    };
    if map.len() > 1 {
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        return Err(CompileError::at(
            ErrorKind::MalformedNode,
            trail,
            format!(
                "node must have exactly one opcode key, found {}: {}",
                map.len(),
                keys.join(", ")
            ),
        ));
    }
    let Some((key, body)) = map.first() else {
        return Err(CompileError::at(
            ErrorKind::MalformedNode,
            trail,
            "node mapping is empty",
        ));
    };

    let op = SurfaceOp::from_key(key).ok_or_else(|| {
        CompileError::at(
            ErrorKind::UnknownOpCode,
            trail.clone(),
            format!("'{key}' is not a recognized opcode"),
        )
    })?;

    let mut node = Node::new(op);
    match body {
        Value::Null => {}
        Value::List(items) => {
            // Block shorthand: `serial: [...]` / `parallel: [...]`.
            if !matches!(
                op,
                SurfaceOp::Primitive(OpCode::Serial) | SurfaceOp::Primitive(OpCode::Parallel)
            ) {
                return Err(CompileError::at(
                    ErrorKind::MalformedNode,
                    trail,
                    format!("a list body is only valid for serial/parallel, not '{op}'"),
                ));
            }
            node.children = parse_children(items, &trail)?;
        }
        Value::Map(fields) => {
            for (field, field_value) in fields {
                match field.as_str() {
                    "inputs" => node.wiring.inputs = parse_inputs(field_value, &trail)?,
                    "output" => {
                        let output = field_value.as_str().ok_or_else(|| {
                            CompileError::at(
                                ErrorKind::MalformedNode,
                                trail.clone(),
                                format!(
                                    "'output' must be a string, got {}",
                                    field_value.type_name()
                                ),
                            )
                        })?;
                        node.wiring.output = Some(output.to_string());
                    }
                    "contents" | "children" => match field_value {
                        Value::List(items) => {
                            node.children.extend(parse_children(items, &trail)?)
                        }
                        Value::Map(_) => {
                            node.children.push(parse_single_child(
                                field_value,
                                &trail,
                                node.children.len(),
                            )?);
                        }
                        other => {
                            return Err(CompileError::at(
                                ErrorKind::MalformedNode,
                                trail,
                                format!(
                                    "'{field}' must be a mapping or a list, got {}",
                                    other.type_name()
                                ),
                            ));
                        }
                    },
                    "worker" if op == SurfaceOp::Sugar(SugarOp::FanOut) => {
                        node.children.push(parse_single_child(
                            field_value,
                            &trail,
                            node.children.len(),
                        )?);
                    }
                    _ => {
                        node.params.insert(field.clone(), field_value.clone());
                    }
                }
            }
        }
        other => {
            return Err(CompileError::at(
                ErrorKind::MalformedNode,
                trail,
                format!("opcode body must be a mapping, got {}", other.type_name()),
            ));
        }
    }

    if let SurfaceOp::Primitive(primitive) = op {
        if primitive.is_atom() && !node.children.is_empty() {
            return Err(CompileError::at(
                ErrorKind::MalformedNode,
                trail,
                format!("'{primitive}' is an atom and cannot carry children"),
            ));
        }
    }

    Ok(node)
}

fn parse_children(items: &[Value], parent_trail: &StackPath) -> Result<Vec<Node>, CompileError> {
    let mut alloc = PathAllocator::new();
    let mut children = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let trail = child_trail(item, parent_trail, &mut alloc, index);
        children.push(parse_node(item, trail)?);
    }
    Ok(children)
}

fn parse_single_child(
    value: &Value,
    parent_trail: &StackPath,
    index: usize,
) -> Result<Node, CompileError> {
    let mut alloc = PathAllocator::new();
    let trail = child_trail(value, parent_trail, &mut alloc, index);
    parse_node(value, trail)
}

/// Provisional error path for a child node. Falls back to a positional
/// segment when the child's opcode cannot be determined yet.
fn child_trail(
    value: &Value,
    parent: &StackPath,
    alloc: &mut PathAllocator,
    index: usize,
) -> StackPath {
    let op = value
        .as_map()
        .and_then(|m| m.first())
        .and_then(|(key, _)| SurfaceOp::from_key(key));
    match op {
        Some(op) => alloc.next(parent, op.physical()),
        None => parent.append(format!("child_{index}")),
    }
}

fn parse_inputs(value: &Value, trail: &StackPath) -> Result<Vec<String>, CompileError> {
    let items = value.as_list().ok_or_else(|| {
        CompileError::at(
            ErrorKind::MalformedNode,
            trail.clone(),
            format!("'inputs' must be a list, got {}", value.type_name()),
        )
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(String::from).ok_or_else(|| {
                CompileError::at(
                    ErrorKind::MalformedNode,
                    trail.clone(),
                    format!("'inputs' entries must be strings, got {}", item.type_name()),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_yaml(source: &str) -> Result<Node, CompileError> {
        let value: Value = serde_yaml::from_str(source).unwrap();
        parse(&value)
    }

    #[test]
    fn test_worker_shorthand_split() {
        let node = parse_yaml(
            "worker:\n  agent: Author\n  inputs: [Spec]\n  output: Draft\n  timeout: 30\n",
        )
        .unwrap();
        assert_eq!(node.op, SurfaceOp::Primitive(OpCode::Worker));
        assert_eq!(node.wiring.inputs, vec!["Spec".to_string()]);
        assert_eq!(node.wiring.output.as_deref(), Some("Draft"));
        assert_eq!(node.param_str("agent"), Some("Author"));
        assert_eq!(node.param_int("timeout"), Some(30));
        assert!(node.param("inputs").is_none());
        assert!(node.param("output").is_none());
    }

    #[test]
    fn test_serial_list_shorthand() {
        let node = parse_yaml(
            "serial:\n  - worker: {agent: A, output: X}\n  - worker: {agent: B, output: Y}\n",
        )
        .unwrap();
        assert_eq!(node.op, SurfaceOp::Primitive(OpCode::Serial));
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].param_str("agent"), Some("B"));
    }

    #[test]
    fn test_list_body_rejected_for_atoms() {
        let err = parse_yaml("worker:\n  - worker: {agent: A, output: X}\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedNode);
    }

    #[test]
    fn test_loop_contents_single_mapping() {
        let node = parse_yaml(
            "loop:\n  count: 3\n  contents:\n    worker: {agent: A, output: X}\n",
        )
        .unwrap();
        assert_eq!(node.op, SurfaceOp::Primitive(OpCode::Loop));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.param_int("count"), Some(3));
    }

    #[test]
    fn test_fan_out_worker_template_becomes_child() {
        let node = parse_yaml(
            "fan_out:\n  source: RegionList\n  item_key: region\n  strategy: serial\n  worker:\n    worker: {agent: Analyst, output: Report}\n",
        )
        .unwrap();
        assert_eq!(node.op, SurfaceOp::Sugar(SugarOp::FanOut));
        assert_eq!(node.children.len(), 1);
        assert!(node.param("worker").is_none());
        assert_eq!(node.param_str("source"), Some("RegionList"));
    }

    #[test]
    fn test_unknown_opcode() {
        let err = parse_yaml("spawn_team:\n  agent: A\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownOpCode);
        assert!(err.message.contains("spawn_team"));
    }

    #[test]
    fn test_multi_key_node() {
        let err = parse_yaml("worker: {agent: A, output: X}\nserial: []\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedNode);
        assert!(err.message.contains("exactly one opcode key"));
    }

    #[test]
    fn test_non_mapping_root() {
        let value: Value = serde_yaml::from_str("- a\n- b\n").unwrap();
        let err = parse(&value).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedNode);
    }

    #[test]
    fn test_error_trail_points_into_tree() {
        let err = parse_yaml(
            "serial:\n  - worker: {agent: A, output: X}\n  - mystery: {agent: B}\n",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownOpCode);
        assert_eq!(err.path.as_ref().unwrap().to_string(), "root/child_1");
    }

    #[test]
    fn test_inputs_must_be_string_list() {
        let err = parse_yaml("worker:\n  agent: A\n  inputs: Spec\n  output: X\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedNode);
        assert!(err.message.contains("'inputs' must be a list"));
    }
}

//! Assemble stage: materializes the typed IR.
//!
//! A mechanical tree copy from the working [`Node`] into
//! [`odl_types::IrNode`], with field-by-field verification of the typed
//! schema. Every violation here is a compiler bug - earlier stages
//! guarantee the invariants - so everything fails with
//! `InternalAssemblyError`.

use odl_types::{IrNode, NodeKind, OpCode};

use crate::ast::{Node, SurfaceOp};
use crate::error::{CompileError, ErrorKind};

/// Freezes a resolved tree into the immutable IR.
pub fn assemble(node: Node) -> Result<IrNode, CompileError> {
    let opcode = match node.op {
        SurfaceOp::Primitive(op) => op,
        SurfaceOp::Sugar(sugar) => {
            return Err(CompileError::new(
                ErrorKind::InternalAssemblyError,
                format!("sugar opcode '{sugar}' reached assembly"),
            ));
        }
    };
    let Some(stack_path) = node.path else {
        return Err(CompileError::new(
            ErrorKind::InternalAssemblyError,
            format!("'{opcode}' node has no stack path at assembly"),
        ));
    };

    match opcode.kind() {
        NodeKind::Control => {
            if node.children.is_empty() {
                return Err(CompileError::at(
                    ErrorKind::InternalAssemblyError,
                    stack_path,
                    format!("control node '{opcode}' has no children"),
                ));
            }
        }
        NodeKind::Action | NodeKind::Logic => {
            if !node.children.is_empty() {
                return Err(CompileError::at(
                    ErrorKind::InternalAssemblyError,
                    stack_path,
                    format!("atom '{opcode}' carries children"),
                ));
            }
        }
    }

    let children = node
        .children
        .into_iter()
        .map(assemble)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IrNode {
        stack_path,
        opcode,
        params: node.params,
        wiring: node.wiring,
        children,
    })
}

//! The compilation entry point.

use odl_types::{IrNode, Value};
use tracing::debug;

use crate::error::CompileError;
use crate::{assemble, expand, parse, resolve, syntax, wiring};

/// Compiles a source tree into the execution-kernel IR.
///
/// This is the single public operation of the compiler. It runs the six
/// pipeline stages in order:
///
/// 1. **Parse** - normalize the tree-of-mappings (fails fast)
/// 2. **Syntax check** - per-opcode schemas and naming rules (batched)
/// 3. **Expand** - desugar and assign stack paths (fails fast)
/// 4. **Resolve** - bind inputs to producers (batched)
/// 5. **Wiring check** - duplicate/undefined/cycle defense (fails fast)
/// 6. **Assemble** - freeze the typed [`IrNode`] tree (fails fast)
///
/// The function is pure: no I/O, no global state, and identical sources
/// yield byte-identical IR. Concurrent compilations never interact.
///
/// # Errors
///
/// Returns every diagnostic the failing stage produced. Stages after the
/// failing one do not run.
pub fn compile(source: &Value) -> Result<IrNode, Vec<CompileError>> {
    debug!("phase 1: parse");
    let tree = parse::parse(source).map_err(|e| vec![e])?;

    debug!("phase 2: syntax check");
    syntax::validate(&tree)?;

    debug!("phase 3: expand");
    let tree = expand::expand(tree).map_err(|e| vec![e])?;

    debug!("phase 4: resolve");
    let tree = resolve::resolve(tree)?;

    debug!("phase 5: wiring check");
    wiring::validate(&tree).map_err(|e| vec![e])?;

    debug!("phase 6: assemble");
    let ir = assemble::assemble(tree).map_err(|e| vec![e])?;

    debug!(root = %ir.stack_path, nodes = ir.node_count(), "compilation complete");
    Ok(ir)
}

//! # ODL shared vocabulary
//!
//! Types shared between the ODL compiler and the execution kernel:
//!
//! - [`OpCode`] / [`NodeKind`] - the primitive instruction set
//! - [`StackPath`] - deterministic structural node identity
//! - [`name`] - artifact name classification and reference parsing
//! - [`Value`] - the loosely-typed source tree handed to the compiler
//! - [`IrNode`] - the typed IR record returned by a successful compilation
//!
//! The compiler produces an [`IrNode`] tree; the kernel consumes it. Both
//! sides agree on this crate and nothing else.

pub mod ir;
pub mod name;
pub mod opcode;
pub mod path;
pub mod value;

pub use ir::{IrNode, Wiring};
pub use name::{ArtifactClass, InputModifier, ProjectRef};
pub use opcode::{NodeKind, OpCode, WorkerMode};
pub use path::StackPath;
pub use value::Value;

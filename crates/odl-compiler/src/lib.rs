//! # ODL compiler
//!
//! Compiles an Organizational Definition Language document - a declarative
//! description of collaborating agents - into the typed IR executed by the
//! kernel.
//!
//! ## Architecture
//!
//! The compiler is a linear six-stage pipeline over an in-memory tree:
//!
//! ```text
//! Source tree -> Parse -> Syntax Check -> Expand -> Resolve -> Wiring Check -> Assemble -> IR
//! ```
//!
//! - [`parse`] - normalizes the loosely-typed source tree into [`ast::Node`]s,
//!   splitting shorthand keys into `params` and `wiring`
//! - [`syntax`] - per-opcode schemas and artifact naming rules
//! - [`expand`] - rewrites sugar opcodes (`generate_team`, `approval_gate`,
//!   `ensemble`, `fan_out`) into primitive subtrees and assigns stack paths
//! - [`resolve`] - binds every logical input to its producer's stack path
//!   under the sibling/ancestor visibility rules
//! - [`wiring`] - duplicate-path, undefined-reference, and cycle defense over
//!   the resolved data-flow graph
//! - [`assemble`] - materializes the immutable [`odl_types::IrNode`] tree
//!
//! Compilation is a pure function: no I/O, no global state, and identical
//! sources yield byte-identical IR, stack paths included.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use odl_compiler::compile;
//! use odl_types::Value;
//!
//! let source: Value = load_document();
//! match compile(&source) {
//!     Ok(ir) => hand_to_kernel(ir),
//!     Err(errors) => eprintln!("{}", odl_compiler::error::format_errors(&errors)),
//! }
//! ```

pub mod assemble;
pub mod ast;
pub mod compile;
pub mod error;
pub mod expand;
pub mod parse;
pub mod resolve;
pub mod syntax;
pub mod wiring;

pub use compile::compile;
pub use error::{CompileError, ErrorKind, Stage};

/// Compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Compile-time diagnostics.
//!
//! Every failure is a [`CompileError`]: an [`ErrorKind`] drawn from the
//! closed taxonomy, the offending node's stack path once one is known, a
//! human message, and optional notes. Errors report the pipeline
//! [`Stage`] that detected them.
//!
//! The Syntax and Resolve stages collect every error in the tree before
//! returning, so users see one batched report; the remaining stages fail
//! fast on the first error they cannot contextualize. Nothing is retried:
//! compilation is deterministic and has no transient failures.

use std::fmt;

use odl_types::StackPath;

/// Pipeline stage that detected a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Syntax,
    Expand,
    Resolve,
    Wiring,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Syntax => "syntax",
            Stage::Expand => "expand",
            Stage::Resolve => "resolve",
            Stage::Wiring => "wiring",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Category of compilation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Parse
    /// Node is not a single-keyed mapping or has the wrong shape.
    MalformedNode,
    /// Opcode key not in the recognized set.
    UnknownOpCode,

    // Syntax
    /// Artifact name uses the system namespace (`__`).
    ReservedName,
    /// Artifact name uses the private namespace (leading `_`).
    PrivateName,
    /// Artifact name parses as no valid class.
    MalformedName,
    /// Per-opcode schema violation.
    MissingRequiredField,
    /// Project Document used as an output.
    ExternalWriteAttempt,
    /// `fan_out` found within another `fan_out`.
    NestedFanOut,
    /// Duplicate agent id where distinct identity is required.
    DuplicateAgent,

    // Resolve
    /// Input names no visible producer.
    UndefinedReference,
    /// Multiple visible producers with no mediator.
    AmbiguousProducer,
    /// `@prev`/`@history` outside a serial iteration context.
    InvalidModifier,
    /// Dynamic variable used outside a context that binds it.
    UnboundDynamicVariable,

    // Wiring
    /// Cycle in the resolved data-flow graph.
    CircularDependency,
    /// Two nodes carry the same stack path.
    DuplicatePath,

    // Assemble
    /// Schema bug; should be unreachable.
    InternalAssemblyError,
}

impl ErrorKind {
    /// Human-readable name of this error kind.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::MalformedNode => "malformed node",
            ErrorKind::UnknownOpCode => "unknown opcode",
            ErrorKind::ReservedName => "reserved name",
            ErrorKind::PrivateName => "private name",
            ErrorKind::MalformedName => "malformed name",
            ErrorKind::MissingRequiredField => "missing required field",
            ErrorKind::ExternalWriteAttempt => "external write attempt",
            ErrorKind::NestedFanOut => "nested fan_out",
            ErrorKind::DuplicateAgent => "duplicate agent",
            ErrorKind::UndefinedReference => "undefined reference",
            ErrorKind::AmbiguousProducer => "ambiguous producer",
            ErrorKind::InvalidModifier => "invalid modifier",
            ErrorKind::UnboundDynamicVariable => "unbound dynamic variable",
            ErrorKind::CircularDependency => "circular dependency",
            ErrorKind::DuplicatePath => "duplicate stack path",
            ErrorKind::InternalAssemblyError => "internal assembly error",
        }
    }

    /// Pipeline stage this kind belongs to.
    pub fn stage(self) -> Stage {
        match self {
            ErrorKind::MalformedNode | ErrorKind::UnknownOpCode => Stage::Parse,
            ErrorKind::ReservedName
            | ErrorKind::PrivateName
            | ErrorKind::MalformedName
            | ErrorKind::MissingRequiredField
            | ErrorKind::ExternalWriteAttempt
            | ErrorKind::NestedFanOut
            | ErrorKind::DuplicateAgent => Stage::Syntax,
            ErrorKind::UndefinedReference
            | ErrorKind::AmbiguousProducer
            | ErrorKind::InvalidModifier
            | ErrorKind::UnboundDynamicVariable => Stage::Resolve,
            ErrorKind::CircularDependency | ErrorKind::DuplicatePath => Stage::Wiring,
            ErrorKind::InternalAssemblyError => Stage::Assemble,
        }
    }
}

/// A single compilation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Category of this error.
    pub kind: ErrorKind,
    /// Stack path of the offending node, once known. Parse-stage errors
    /// and syntax errors on not-yet-expanded trees carry provisional
    /// paths computed with the same `{opcode}_{index}` scheme.
    pub path: Option<StackPath>,
    /// Human-readable explanation.
    pub message: String,
    /// Additional context or suggestions.
    pub notes: Vec<String>,
}

impl CompileError {
    /// Creates an error with no node path.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Creates an error anchored at a node path.
    pub fn at(kind: ErrorKind, path: StackPath, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path),
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Adds a note (for chaining).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        self.kind.stage()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error[{}]: {}: {}",
            self.stage(),
            self.kind.name(),
            self.message
        )?;
        if let Some(path) = &self.path {
            write!(f, " (at {path})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Formats a batch of diagnostics, one per line, notes indented below.
pub fn format_errors(errors: &[CompileError]) -> String {
    let mut out = String::new();
    for (i, error) in errors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&error.to_string());
        for note in &error.notes {
            out.push_str("\n  note: ");
            out.push_str(note);
        }
    }
    out
}

//! Deterministic node identity.
//!
//! Every node in an expanded ODL tree is addressed by a stack path: a
//! slash-joined chain of segments under the fixed root segment `root`,
//! e.g. `root/loop_0/serial_0/worker_1`. Each segment is
//! `{opcode}_{sibling_index}`, where the index counts earlier siblings of
//! the same opcode within the parent. The path is a pure function of tree
//! shape, never of parameter values, so recompiling an unchanged document
//! (or one where only agent names changed) reproduces identical paths.
//!
//! The runtime derives physical execution identities from these paths,
//! which is why they must be byte-stable across compilations.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Root segment of every stack path.
pub const ROOT_SEGMENT: &str = "root";

/// A hierarchical structural identifier for a compiled node.
///
/// Paths are immutable and support efficient comparison and hashing. They
/// serialize as their display form (`root/loop_0/serial_0`).
///
/// # Examples
///
/// ```
/// # use odl_types::StackPath;
/// let path = StackPath::root().child("loop", 0).child("serial", 0);
/// assert_eq!(path.to_string(), "root/loop_0/serial_0");
/// assert_eq!(path.parent().unwrap().to_string(), "root/loop_0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackPath {
    segments: Vec<String>,
}

impl StackPath {
    /// The root path, `root`.
    pub fn root() -> Self {
        Self {
            segments: vec![ROOT_SEGMENT.to_string()],
        }
    }

    /// Create a path from raw segments.
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parse a path from its slash-joined display form.
    pub fn parse(s: &str) -> Self {
        Self {
            segments: s.split('/').map(String::from).collect(),
        }
    }

    /// Derive the path of a child: `{self}/{opcode}_{index}`.
    pub fn child(&self, opcode: &str, index: usize) -> Self {
        self.append(format!("{opcode}_{index}"))
    }

    /// Append a pre-formed segment.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for a path with no segments (never produced by the compiler).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            None
        } else {
            Some(Self::new(
                self.segments[..self.segments.len() - 1].to_vec(),
            ))
        }
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &StackPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True if `self` strictly contains `other` (proper ancestor).
    pub fn is_ancestor_of(&self, other: &StackPath) -> bool {
        other.len() > self.len() && other.starts_with(self)
    }
}

impl fmt::Display for StackPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl From<&str> for StackPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for StackPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StackPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("stack path cannot be empty"));
        }
        Ok(Self::parse(&s))
    }
}

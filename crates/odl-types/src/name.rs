//! Artifact name classification.
//!
//! Artifact names are the logical currency of wiring. Four classes exist:
//!
//! - **Job Document** - internal, writable. Plain names with no `:` or
//!   `#`, no `__`, not starting with `_`.
//! - **Project Document** - external, read-only. `Name:ResourceID[@Version]`;
//!   a missing version defaults to `@stable`.
//! - **Reserved** - contains `__`. The system namespace: synthesized
//!   verdict and draft artifacts live here, user documents may not.
//! - **Private** - starts with `_`. Scoped to the synthesizing expansion.
//!
//! Anything else is malformed. `#` never appears in source names; the
//! resolver introduces it when binding a name to its producer path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version applied to a project reference that does not name one.
pub const DEFAULT_VERSION: &str = "stable";

/// Infix of system-generated review/verdict artifacts
/// (`{Target}__Review_{Agent}`).
pub const REVIEW_INFIX: &str = "__Review_";

/// Classification of an artifact name per the naming rules above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactClass {
    /// Internal writable document.
    Job,
    /// External read-only document.
    Project(ProjectRef),
    /// System namespace (`__`).
    Reserved,
    /// Private namespace (leading `_`).
    Private,
    /// None of the above; the payload explains why.
    Malformed(String),
}

/// Classifies an artifact name.
///
/// Input modifiers (`@history`, `@prev`) must be split off first; see
/// [`split_modifier`].
pub fn classify(name: &str) -> ArtifactClass {
    if name.is_empty() {
        return ArtifactClass::Malformed("artifact name is empty".to_string());
    }
    if name.contains('#') {
        return ArtifactClass::Malformed(
            "'#' is assigned by the resolver and cannot appear in source names".to_string(),
        );
    }
    if name.contains(':') {
        return match name.parse::<ProjectRef>() {
            Ok(proj) => ArtifactClass::Project(proj),
            Err(e) => ArtifactClass::Malformed(e.to_string()),
        };
    }
    if name.contains("__") {
        return ArtifactClass::Reserved;
    }
    if name.starts_with('_') {
        return ArtifactClass::Private;
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, '/' | '{' | '}' | '@')) {
        return ArtifactClass::Malformed(format!("forbidden character '{bad}' in artifact name"));
    }
    ArtifactClass::Job
}

/// Builds the system-reserved review artifact name for a target document
/// and a reviewing agent.
pub fn review_artifact(target: &str, agent: &str) -> String {
    format!("{target}{REVIEW_INFIX}{agent}")
}

/// A reference to an external Project Document: `Name:ResourceID[@Version]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    pub resource: String,
    pub version: String,
}

/// Why a project reference failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectRefError {
    #[error("project reference has no ':' separator")]
    MissingSeparator,
    #[error("project reference contains more than one ':'")]
    ExtraSeparator,
    #[error("project reference has an empty name part")]
    EmptyName,
    #[error("project reference has an empty resource part")]
    EmptyResource,
    #[error("project reference has an empty version after '@'")]
    EmptyVersion,
    #[error("forbidden character '{0}' in project reference")]
    ForbiddenChar(char),
}

impl FromStr for ProjectRef {
    type Err = ProjectRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s.split_once(':').ok_or(ProjectRefError::MissingSeparator)?;
        if rest.contains(':') {
            return Err(ProjectRefError::ExtraSeparator);
        }
        let (resource, version) = match rest.split_once('@') {
            Some((resource, version)) => {
                if version.is_empty() {
                    return Err(ProjectRefError::EmptyVersion);
                }
                (resource, version)
            }
            None => (rest, DEFAULT_VERSION),
        };
        if name.is_empty() {
            return Err(ProjectRefError::EmptyName);
        }
        if resource.is_empty() {
            return Err(ProjectRefError::EmptyResource);
        }
        for part in [name, resource, version] {
            if let Some(bad) = part
                .chars()
                .find(|c| matches!(c, '/' | '{' | '}' | '@' | '#' | '_'))
            {
                return Err(ProjectRefError::ForbiddenChar(bad));
            }
        }
        Ok(ProjectRef {
            name: name.to_string(),
            resource: resource.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.name, self.resource, self.version)
    }
}

/// Iteration-context input modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModifier {
    /// The previous iteration's instance only.
    Prev,
    /// The ordered sequence of all prior iterations' instances.
    History,
}

impl InputModifier {
    pub fn as_suffix(self) -> &'static str {
        match self {
            InputModifier::Prev => "@prev",
            InputModifier::History => "@history",
        }
    }
}

impl fmt::Display for InputModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_suffix())
    }
}

/// Splits a trailing input modifier off a name or resolved reference.
///
/// `"Report@history"` becomes `("Report", Some(History))`; a name with no
/// recognized suffix is returned unchanged.
pub fn split_modifier(input: &str) -> (&str, Option<InputModifier>) {
    for modifier in [InputModifier::History, InputModifier::Prev] {
        if let Some(base) = input.strip_suffix(modifier.as_suffix()) {
            return (base, Some(modifier));
        }
    }
    (input, None)
}

/// True if the string embeds a dynamic variable (`$LOOP`, `$KEY`, ...).
///
/// Dynamic references are left symbolic by the resolver and bound by the
/// kernel per iteration.
pub fn is_dynamic(input: &str) -> bool {
    input.contains('$')
}

//! Briefing merge.
//!
//! A sugar's `briefing` block configures the agents its expansion
//! synthesizes. Three layers merge, lowest precedence first:
//!
//! 1. **Global** - scalar entries at the top of the block, shared by all
//!    agents
//! 2. **Agent-specific** - a nested mapping keyed by agent name
//! 3. **System** - values injected by the expander (`agent`, `mode`);
//!    user keys can never override these

use indexmap::IndexMap;
use odl_types::{Value, WorkerMode};

/// Removes the `briefing` block from a sugar's params.
///
/// The syntax stage already rejected non-mapping briefings, so anything
/// else collapses to empty.
pub(crate) fn take(params: &mut IndexMap<String, Value>) -> IndexMap<String, Value> {
    match params.shift_remove("briefing") {
        Some(Value::Map(map)) => map,
        _ => IndexMap::new(),
    }
}

/// System parameter layer for a synthesized agent node.
pub(crate) fn system(agent: &str, mode: WorkerMode) -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("agent".to_string(), Value::from(agent));
    map.insert("mode".to_string(), Value::from(mode.as_str()));
    map
}

/// Merges the briefing layers for one agent.
pub fn merge(
    briefing: &IndexMap<String, Value>,
    agent: &str,
    system: IndexMap<String, Value>,
) -> IndexMap<String, Value> {
    let mut merged = IndexMap::new();
    // Global layer: scalar entries. Nested mappings are agent sections.
    for (key, value) in briefing {
        if value.as_map().is_none() {
            merged.insert(key.clone(), value.clone());
        }
    }
    // Agent-specific layer.
    if let Some(Value::Map(specific)) = briefing.get(agent) {
        for (key, value) in specific {
            merged.insert(key.clone(), value.clone());
        }
    }
    // System layer wins.
    for (key, value) in system {
        merged.insert(key, value);
    }
    merged
}

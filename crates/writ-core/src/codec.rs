//! Inscription text format: decimal entity ids, one per line, no trailing newline.

use writ_types::{EntityId, EntityRef};

use crate::host::EntityLookup;

pub fn encode(entries: &[EntityRef]) -> String {
    entries
        .iter()
        .map(|entry| entry.id.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Length `encode` would produce, without building the string.
pub fn encoded_len(entries: &[EntityRef]) -> usize {
    let digits: usize = entries.iter().map(|entry| decimal_width(entry.id.0)).sum();
    digits + entries.len().saturating_sub(1)
}

/// Best-effort decode. Malformed lines are logged and skipped; ids that no
/// longer resolve are dropped without a word, the entity having died or
/// been removed since the text was written.
pub fn decode(text: &str, lookup: &dyn EntityLookup) -> Vec<EntityRef> {
    let mut entries = Vec::new();
    for line in text.split('\n').filter(|line| !line.is_empty()) {
        match line.parse::<EntityId>() {
            Ok(id) => {
                if let Some(entity) = lookup.resolve(id) {
                    entries.push(entity);
                }
            }
            Err(_) => {
                tracing::warn!(line, "invalid entity id on animal contract");
            }
        }
    }
    entries
}

fn decimal_width(mut value: u64) -> usize {
    let mut width = 1;
    while value >= 10 {
        value /= 10;
        width += 1;
    }
    width
}

//! Weakness Profile
//!
//! A user's weaknesses are stored as an append-only list of focus labels, one
//! per recorded correction. Readers want the distinct topics instead, ranked
//! by how often they recur.

use serde::Serialize;
use std::collections::HashMap;

/// One distinct grammar topic and how many corrections named it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaknessEntry {
    pub topic: String,
    pub occurrences: usize,
}

/// Collapses the raw label list into distinct topics.
///
/// Labels are matched case-insensitively after trimming and keep the spelling
/// of their first appearance. Entries are ordered by occurrences (descending),
/// then by first appearance. Blank labels are dropped.
pub fn weakness_profile(weaknesses: &[String]) -> Vec<WeaknessEntry> {
    let mut entries: Vec<WeaknessEntry> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for label in weaknesses {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let key = label.to_lowercase();
        match index_by_key.get(&key) {
            Some(&i) => entries[i].occurrences += 1,
            None => {
                index_by_key.insert(key, entries.len());
                entries.push(WeaknessEntry {
                    topic: label.to_string(),
                    occurrences: 1,
                });
            }
        }
    }

    // Stable sort keeps first-appearance order among ties.
    entries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    entries
}

//! Priority-based merge of node candidates.

use super::{NodeCandidate, is_informational_node, parse_node};
use std::collections::HashSet;

/// Merge candidates into an ordered, duplicate-free URI list.
///
/// Candidates are visited by descending priority, keeping input order among
/// equal priorities. A candidate is dropped when its exact URI or its
/// fingerprint key was already emitted. URIs without a fingerprint are only
/// compared by exact text. Informational nodes are moved to the front,
/// preserving relative order on both sides.
pub fn deduplicate_nodes(mut candidates: Vec<NodeCandidate>) -> Vec<String> {
    // sort_by is stable
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut seen_raw: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if seen_raw.contains(&candidate.uri) {
            continue;
        }

        match parse_node(&candidate.uri) {
            Some(fingerprint) => {
                if seen_keys.insert(fingerprint.key()) {
                    seen_raw.insert(candidate.uri.clone());
                    merged.push(candidate.uri);
                } else {
                    tracing::trace!(
                        source = %candidate.source,
                        "dropping lower-priority duplicate"
                    );
                }
            }
            None => {
                seen_raw.insert(candidate.uri.clone());
                merged.push(candidate.uri);
            }
        }
    }

    let (mut informational, regular): (Vec<String>, Vec<String>) = merged
        .into_iter()
        .partition(|uri| is_informational_node(uri));
    informational.extend(regular);
    informational
}

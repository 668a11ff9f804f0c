use indexmap::IndexMap;
use std::collections::HashSet;

/// Entries present on the page but not yet known, in page order.
///
/// Pure set difference on the normalized names; the observed map's iteration
/// order is preserved so logging and processing order stay deterministic.
pub fn new_alerts(
    observed: &IndexMap<String, String>,
    known: &[String],
) -> IndexMap<String, String> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();
    observed
        .iter()
        .filter(|(name, _)| !known.contains(name.as_str()))
        .map(|(name, url)| (name.clone(), url.clone()))
        .collect()
}

// ── Tests ──

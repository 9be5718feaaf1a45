//! Edge computation from version-range patterns.

use crate::error::Result;
use crate::model::State;
use crate::range::{parse_version, VersionRange};
use std::collections::BTreeMap;
use tracing::trace;

/// Expands `(from, range)` patterns into the channel's edge map.
///
/// For every pattern, the target list holds the id of each non-deprecated
/// release whose version satisfies the range, ordered from oldest to newest.
/// A `from` id with no matching release gets no entry at all.
///
/// # Errors
///
/// Returns an error if a range or a release id does not parse.
pub fn edges_from_patterns<'a, I>(
    patterns: I,
    releases: &[State],
) -> Result<BTreeMap<String, Vec<String>>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut candidates = releases
        .iter()
        .filter(|r| !r.deprecated)
        .map(|r| Ok((parse_version(&r.id)?, r.id.as_str())))
        .collect::<Result<Vec<_>>>()?;
    candidates.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut edges = BTreeMap::new();
    for (from, to) in patterns {
        let range = VersionRange::parse(to)?;
        let targets: Vec<String> = candidates
            .iter()
            .filter(|(version, _)| range.matches(version))
            .map(|(_, id)| (*id).to_string())
            .collect();
        trace!(from, range = %range, count = targets.len(), "Expanded edge pattern");
        if !targets.is_empty() {
            edges.insert(from.to_string(), targets);
        }
    }
    Ok(edges)
}

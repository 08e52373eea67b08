use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{MatchEntry, MatchRecord, Profile};

/// Project the viewer-facing match list.
///
/// Pure read-side composition: each match containing the viewer is joined
/// with the counterpart's profile, sorted most-recent first. Matches whose
/// counterpart profile is missing from `profiles` are omitted rather than
/// failing the whole list; matches without a usable `matched_at` sort last.
/// Ties break by match id ascending so the output is stable.
pub fn project_match_list(
    viewer_id: &str,
    matches: &[MatchRecord],
    profiles: &HashMap<String, Profile>,
) -> Vec<MatchEntry> {
    let mut entries: Vec<MatchEntry> = matches
        .iter()
        .filter(|record| record.contains(viewer_id))
        .filter_map(|record| {
            let counterpart_id = record.counterpart_of(viewer_id)?;
            let counterpart = profiles.get(counterpart_id)?.clone();
            Some(MatchEntry {
                match_id: record.id.clone(),
                counterpart,
                matched_at: record.matched_at,
            })
        })
        .collect();

    entries.sort_by(|a, b| match (a.matched_at, b.matched_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.match_id.cmp(&b.match_id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.match_id.cmp(&b.match_id),
    });

    entries
}

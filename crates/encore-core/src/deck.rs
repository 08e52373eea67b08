use std::collections::HashSet;

use crate::types::{DeckEntry, Profile, Role};

/// Build the swipe deck for a viewer.
///
/// Pure function of its inputs: keeps profiles of the opposite role,
/// excluding the viewer and anyone already matched, preserving pool order so
/// swipe order is reproducible. An empty deck is a normal outcome, not an
/// error.
pub fn build_deck(
    viewer_id: &str,
    viewer_role: Role,
    pool: &[Profile],
    matched_ids: &HashSet<String>,
) -> Vec<DeckEntry> {
    let wanted = viewer_role.opposite();

    pool.iter()
        .filter(|profile| {
            profile.role == wanted
                && profile.id != viewer_id
                && !matched_ids.contains(&profile.id)
        })
        .cloned()
        .enumerate()
        .map(|(index, profile)| DeckEntry { index, profile })
        .collect()
}

//! Generic three-way set comparison between a desired and an actual
//! map, the primitive every reconciler diff is built on.
//!
//! Iteration order is always ascending by key (both inputs are
//! `BTreeMap`s), which makes the command stream of a pass — and every
//! test asserting on it — reproducible.
use std::collections::BTreeMap;

/// The outcome of comparing `desired` against `actual`.
#[derive(Debug)]
pub struct Changes<'a, K, A, B> {
    /// Keys present in `desired` only
    pub added: Vec<(&'a K, &'a A)>,
    /// Keys present in `actual` only
    pub removed: Vec<(&'a K, &'a B)>,
    /// Keys present in both where the equality predicate failed
    pub changed: Vec<(&'a K, &'a A, &'a B)>,
}

impl<K, A, B> Changes<'_, K, A, B> {
    /// Whether the two maps were equivalent under the predicate.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare two maps under an equality predicate.
pub fn compare<'a, K, A, B, F>(
    desired: &'a BTreeMap<K, A>,
    actual: &'a BTreeMap<K, B>,
    mut eq: F,
) -> Changes<'a, K, A, B>
where
    K: Ord,
    F: FnMut(&K, &A, &B) -> bool,
{
    let mut changes = Changes {
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
    };
    for (key, want) in desired {
        match actual.get(key) {
            None => changes.added.push((key, want)),
            Some(have) if !eq(key, want, have) => changes.changed.push((key, want, have)),
            Some(_) => {}
        }
    }
    for (key, have) in actual {
        if !desired.contains_key(key) {
            changes.removed.push((key, have));
        }
    }
    changes
}

/// Streaming form of [`compare`]: one callback per outcome, invoked
/// in ascending key order, additions and changes before removals.
pub fn compare_with<'a, K, A, B, Eq, Added, Removed, Changed>(
    desired: &'a BTreeMap<K, A>,
    actual: &'a BTreeMap<K, B>,
    mut eq: Eq,
    mut on_added: Added,
    mut on_removed: Removed,
    mut on_changed: Changed,
) where
    K: Ord,
    Eq: FnMut(&K, &A, &B) -> bool,
    Added: FnMut(&'a K, &'a A),
    Removed: FnMut(&'a K, &'a B),
    Changed: FnMut(&'a K, &'a A, &'a B),
{
    for (key, want) in desired {
        match actual.get(key) {
            None => on_added(key, want),
            Some(have) if !eq(key, want, have) => on_changed(key, want, have),
            Some(_) => {}
        }
    }
    for (key, have) in actual {
        if !desired.contains_key(key) {
            on_removed(key, have);
        }
    }
}

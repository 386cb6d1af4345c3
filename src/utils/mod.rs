use std::collections::HashMap;
use std::hash::Hash;

pub mod validation;

/// Falls back to `default` when the requested limit is zero or above `max`.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    match requested {
        Some(limit) if limit > 0 && limit <= max => limit,
        _ => default,
    }
}

/// Keys ordered by descending count; ties broken by key for stable output.
pub fn top_by_count<K: Clone + Ord + Hash>(counts: &HashMap<K, usize>, k: usize) -> Vec<K> {
    let mut entries: Vec<(&K, &usize)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(k).map(|(key, _)| key.clone()).collect()
}

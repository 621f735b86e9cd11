//! Per-field-kind merge rules

use std::collections::BTreeMap;

/// Non-empty override wins
pub fn scalar(base: &str, overlay: &str) -> String {
    if overlay.is_empty() {
        base.to_string()
    } else {
        overlay.to_string()
    }
}

/// Set override wins; otherwise base is inherited including its absence
pub fn optional<T: Clone>(base: &Option<T>, overlay: &Option<T>) -> Option<T> {
    match overlay {
        Some(_) => overlay.clone(),
        None => base.clone(),
    }
}

/// Base followed by override, duplicates kept
pub fn concat<T: Clone>(base: &[T], overlay: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(base.len() + overlay.len());
    out.extend_from_slice(base);
    out.extend_from_slice(overlay);
    out
}

/// Identity-keyed list merge.
///
/// Base entries keep their order. An override entry whose key is already
/// present replaces that entry at its position; otherwise it is appended.
pub fn keyed<T, K, F>(base: &[T], overlay: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut out = base.to_vec();
    for entry in overlay {
        let k = key(entry);
        match out.iter().position(|existing| key(existing) == k) {
            Some(idx) => out[idx] = entry.clone(),
            None => out.push(entry.clone()),
        }
    }
    out
}

/// Shallow union, override wins on collision
pub fn union<K: Ord + Clone, V: Clone>(
    base: &BTreeMap<K, V>,
    overlay: &BTreeMap<K, V>,
) -> BTreeMap<K, V> {
    let mut out = base.clone();
    for (k, v) in overlay {
        out.insert(k.clone(), v.clone());
    }
    out
}

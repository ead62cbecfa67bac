//! Longest-prefix key matching.
//!
//! # Responsibilities
//! - Pick the longest registered pattern that prefixes a lookup key
//! - Keep the root pattern from acting as a catch-all
//!
//! # Design Decisions
//! - Patterns are compared as plain strings, no segment awareness, so
//!   `/caps/seed` matches a lookup of `/caps/seedling`
//! - A pattern whose path is exactly `/` only matches a lookup whose path is
//!   exactly `/`; otherwise it would shadow the default login path
//! - Ties cannot occur between distinct patterns of equal length that both
//!   prefix the same key (they would be equal strings), except in
//!   case-insensitive mode; there the first pattern in iteration order wins

/// Path component of a table key.
///
/// Stream handler keys are `METHOD:path`; every other table is keyed by the
/// path itself.
pub fn path_component(key: &str) -> &str {
    if key.starts_with('/') {
        return key;
    }
    match key.split_once(':') {
        Some((_, path)) => path,
        None => key,
    }
}

/// Whether `pattern` may be used as a prefix match for `key`.
pub fn prefix_matches(pattern: &str, key: &str, case_insensitive: bool) -> bool {
    if path_component(pattern) == "/" && path_component(key) != "/" {
        return false;
    }
    if pattern.len() > key.len() {
        return false;
    }
    let head = &key.as_bytes()[..pattern.len()];
    if case_insensitive {
        head.eq_ignore_ascii_case(pattern.as_bytes())
    } else {
        head == pattern.as_bytes()
    }
}

/// Select the longest pattern that prefixes `key`.
///
/// Iteration order breaks ties: an equal-length candidate never replaces an
/// earlier one.
pub fn best_prefix<'a, I>(patterns: I, key: &str, case_insensitive: bool) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<&'a str> = None;
    for pattern in patterns {
        if !prefix_matches(pattern, key, case_insensitive) {
            continue;
        }
        if best.map_or(true, |b| pattern.len() > b.len()) {
            best = Some(pattern);
        }
    }
    best
}

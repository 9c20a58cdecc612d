//! Dotted key-path parsing and glob matching.
//!
//! A key is `seg(.seg)*` where `seg` is non-empty and contains no `.`. The
//! first segment is the *root key*; everything after the first `.` is the
//! *sub-path*.

use crate::error::{EdgeKvError, Result};

/// Split a key into its root segment and the remaining sub-path.
///
/// `split_first("a") == ("a", "")`; `split_first("a.b.c") == ("a", "b.c")`.
pub fn split_first(key: &str) -> Result<(&str, &str)> {
    if key.is_empty() {
        return Err(EdgeKvError::Config("key must not be empty".into()));
    }
    match key.split_once('.') {
        Some((root, rest)) => Ok((root, rest)),
        None => Ok((key, "")),
    }
}

/// Split a key into everything before the last segment and the last segment
/// itself. `split_last("a") == ("", "a")`; `split_last("a.b.c") == ("a.b", "c")`.
pub fn split_last(key: &str) -> Result<(&str, &str)> {
    if key.is_empty() {
        return Err(EdgeKvError::Config("key must not be empty".into()));
    }
    match key.rsplit_once('.') {
        Some((head, leaf)) => Ok((head, leaf)),
        None => Ok(("", key)),
    }
}

/// Join path segments back into a dotted key. Empty segments are skipped.
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// Split a key into its individual segments (`"a.b.c"` -> `["a","b","c"]`).
pub fn segments(key: &str) -> Vec<&str> {
    if key.is_empty() {
        Vec::new()
    } else {
        key.split('.').collect()
    }
}

/// Glob-match a dotted key against a pattern: `*` matches exactly one
/// segment, `?` matches exactly one character within a segment, any other
/// literal segment must match verbatim. The pattern and the key must have
/// the same number of segments — `"test"` never matches `"test.*"` because
/// `test` has no dot.
pub fn matches(pattern: &str, key: &str) -> bool {
    let pat_segs = segments(pattern);
    let key_segs = segments(key);
    if pat_segs.len() != key_segs.len() {
        return false;
    }
    pat_segs
        .iter()
        .zip(key_segs.iter())
        .all(|(p, k)| segment_matches(p, k))
}

/// Glob-match one segment. `*` matches zero or more characters (so a bare
/// `*` matches a whole segment, and `"*:test"` — the shape `CenterNode::
/// watch_edges` composes to match any edge namespace ahead of a literal
/// suffix — matches `"E1:test"`); `?` matches exactly one character.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let seg: Vec<char> = segment.chars().collect();
    glob_match(&pat, &seg)
}

fn glob_match(pat: &[char], seg: &[char]) -> bool {
    match pat.first() {
        None => seg.is_empty(),
        Some('*') => glob_match(&pat[1..], seg) || (!seg.is_empty() && glob_match(pat, &seg[1..])),
        Some('?') => !seg.is_empty() && glob_match(&pat[1..], &seg[1..]),
        Some(c) => seg.first() == Some(c) && glob_match(&pat[1..], &seg[1..]),
    }
}

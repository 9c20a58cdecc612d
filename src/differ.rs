//! Structural diff/patch between two [`Value`] documents.
//!
//! `diff` recursively compares two map trees, emitting one `create`/
//! `update`/`delete` [`Change`] per path that actually differs. A key
//! removed at the *outermost* comparison collapses the whole diff to a
//! two-entry "replace whole" changelog (see the root-deletion note in
//! `DESIGN.md`); the same removal discovered while recursing into a nested
//! sub-map does not — it is just an ordinary `delete` entry at its own path.
//!
//! Every path a `diff` emits is relative to the document `patch` is handed
//! — i.e. the value already resolved at the full key (`Store::get`'s
//! result), not a document keyed by the root segment. The whole-replace
//! fallback therefore uses an empty path (`Change::delete(vec![])` as a
//! no-op placeholder, `Change::create(vec![], new)` as the actual replace),
//! matching every other branch here.

use edgekv_proto::{Change, ChangeKind, Changelog, Value};

/// Compute the changelog that turns `old` into `new`.
pub fn diff(old: &Value, new: &Value) -> Changelog {
    if old == new {
        return Vec::new();
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let root_level_deletion = old_map.keys().any(|k| !new_map.contains_key(k));
            if root_level_deletion {
                return vec![Change::delete(Vec::new()), Change::create(Vec::new(), new.clone())];
            }
            let mut out = Vec::new();
            diff_objects(&mut Vec::new(), old, new, &mut out);
            out
        }
        (Value::Null, _) => vec![Change::create(Vec::new(), new.clone())],
        _ => vec![Change::update(Vec::new(), old.clone(), new.clone())],
    }
}

/// Recursive helper: compares `old` and `new` at `path`, appending changes
/// to `out`. Used for every level below the outermost `diff` call.
fn diff_objects(path: &mut Vec<String>, old: &Value, new: &Value, out: &mut Changelog) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, new_val) in new_map {
                path.push(key.clone());
                match old_map.get(key) {
                    None => out.push(Change::create(path.clone(), new_val.clone())),
                    Some(old_val) if old_val == new_val => {}
                    Some(old_val) => diff_objects(path, old_val, new_val, out),
                }
                path.pop();
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    path.push(key.clone());
                    out.push(Change::delete(path.clone()));
                    path.pop();
                }
            }
        }
        _ if old == new => {}
        (Value::Null, _) => out.push(Change::create(path.clone(), new.clone())),
        _ => out.push(Change::update(path.clone(), old.clone(), new.clone())),
    }
}

/// Apply a changelog to `value`, returning the patched document.
///
/// `create` auto-creates missing intermediate objects; `delete` on an
/// absent path is a no-op; `update` on an absent path degrades to a create.
pub fn patch(value: &Value, changes: &Changelog) -> Value {
    let mut out = value.clone();
    for change in changes {
        let path: Vec<&str> = change.path.iter().map(String::as_str).collect();
        match change.kind {
            ChangeKind::Delete => {
                out.delete_path(&path);
            }
            ChangeKind::Create | ChangeKind::Update => {
                if let Some(to) = &change.to {
                    out.set_path(&path, to.clone());
                }
            }
        }
    }
    out
}

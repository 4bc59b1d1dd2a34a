// ── Synthetic identity codec ──
//
// Composite identifiers join natural-key components with `|`. Parsing is
// arity-checked and rejects empty components, so a malformed import id
// fails fast instead of producing a state that can never be read back.

use thiserror::Error;

const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected format for import identifier {id:?}: expected {expected}")]
pub struct IdentityError {
    pub id: String,
    pub expected: &'static str,
}

/// Join natural-key components into a composite identifier.
pub fn join_id<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(part);
    }
    out
}

/// Split a composite identifier into exactly `arity` non-empty components.
///
/// Splits on the first `arity - 1` separators, so a trailing component may
/// itself contain `|` only when the id format allows it (none do today).
pub fn split_id(id: &str, arity: usize, expected: &'static str) -> Result<Vec<String>, IdentityError> {
    let parts: Vec<&str> = id.splitn(arity, SEPARATOR).collect();
    if parts.len() != arity || parts.iter().any(|p| p.is_empty()) {
        return Err(IdentityError {
            id: id.to_owned(),
            expected,
        });
    }
    Ok(parts.into_iter().map(str::to_owned).collect())
}

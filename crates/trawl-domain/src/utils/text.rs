//! Text sanitation helpers shared by the connector runtime and pipeline.

/// Strip NUL characters from a string, returning it unchanged when clean.
///
/// The relational store cannot hold NUL bytes in text columns, and some
/// sources emit them in ids and titles.
#[must_use]
pub fn strip_nul(value: &str) -> String {
    if value.contains('\0') {
        value.replace('\0', "")
    } else {
        value.to_owned()
    }
}

/// Returns `true` when the string contains NUL characters.
#[must_use]
pub fn has_nul(value: &str) -> bool {
    value.contains('\0')
}

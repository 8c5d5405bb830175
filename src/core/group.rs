//! Group key conventions.
//!
//! Groups are dense non-negative integers rendered as `G{n}`; `-1` hides a
//! channel. Any other non-empty string is accepted as an opaque user key.

pub const HIDDEN_GROUP: &str = "-1";
pub const GROUP_PREFIX: &str = "G";

#[must_use]
pub fn group_key(index: usize) -> String {
    format!("{GROUP_PREFIX}{index}")
}

#[must_use]
pub fn is_hidden(group: &str) -> bool {
    group.trim() == HIDDEN_GROUP
}

#[must_use]
pub fn is_unassigned(group: &str) -> bool {
    group.trim().is_empty()
}

/// Integer suffix of a `G{n}` key (bare integers are accepted too).
#[must_use]
pub fn group_index(group: &str) -> Option<usize> {
    let trimmed = group.trim();
    let digits = trimmed.strip_prefix(GROUP_PREFIX).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// First free index after every parseable key, or 0 when none parse.
///
/// Keys at `usize::MAX` have no successor and are ignored.
#[must_use]
pub fn next_group_index<'a>(groups: impl IntoIterator<Item = &'a str>) -> usize {
    groups
        .into_iter()
        .filter_map(group_index)
        .filter_map(|index| index.checked_add(1))
        .max()
        .unwrap_or(0)
}

/// Returns `G{max+1}` over every parseable key, or `G0` when none parse.
#[must_use]
pub fn next_group_key<'a>(groups: impl IntoIterator<Item = &'a str>) -> String {
    group_key(next_group_index(groups))
}

#[cfg(test)]
mod tests {
    use super::{group_index, is_hidden, next_group_index, next_group_key};

    #[test]
    fn group_index_parses_conventional_keys() {
        assert_eq!(group_index("G0"), Some(0));
        assert_eq!(group_index(" G12 "), Some(12));
        assert_eq!(group_index("7"), Some(7));
        assert_eq!(group_index("G"), None);
        assert_eq!(group_index("-1"), None);
        assert_eq!(group_index("Gx"), None);
    }

    #[test]
    fn next_group_key_skips_opaque_keys() {
        assert_eq!(next_group_key(["G0", "G3", "custom", ""]), "G4");
        assert_eq!(next_group_key(std::iter::empty()), "G0");
        assert!(is_hidden("-1"));
        assert!(!is_hidden("G1"));
    }

    #[test]
    fn keys_without_a_successor_do_not_overflow() {
        let top = format!("G{}", usize::MAX);
        assert_eq!(group_index(&top), Some(usize::MAX));
        assert_eq!(next_group_key([top.as_str()]), "G0");
        assert_eq!(next_group_index([top.as_str(), "G4"]), 5);
        assert_eq!(group_index("G99999999999999999999999"), None);
    }
}

//! Name normalization for identity matching

/// Normalizes a person name for exact comparison.
///
/// Case-folds, drops every character that is neither alphanumeric nor
/// whitespace, and collapses whitespace runs to a single space.
///
/// ```
/// use passport_sync::core::identity::normalize_name;
///
/// assert_eq!(normalize_name("  Betty   WILLIAMS "), "betty williams");
/// assert_eq!(normalize_name("O'Brien, Seán"), "obrien seán");
/// ```
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when two names are equal after normalization
pub fn names_match(left: &str, right: &str) -> bool {
    let left = normalize_name(left);
    !left.is_empty() && left == normalize_name(right)
}

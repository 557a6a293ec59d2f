/// Characters dropped from attribute names during normalization.
const STRIPPED: [char; 5] = [' ', '-', '(', ')', '?'];

/// Normalize an attribute name so that minor spelling variations compare
/// equal.
///
/// The name is lower-cased and spaces, dashes, parentheses and question
/// marks are removed, so `"Entry #"`, `"ENTRY #"` and `"Entry#"` all become
/// `"entry#"`.
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(|c| !STRIPPED.contains(c)).flat_map(char::to_lowercase).collect()
}

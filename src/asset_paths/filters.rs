use regex::Regex;

fn external_reference_patterns() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^[a-z][a-z0-9+.-]*:").expect("invalid scheme regex"),
                Regex::new(r"^//").expect("invalid protocol-relative regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
                Regex::new(r"\{\{|\[\[").expect("invalid binding regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a `src`/`href` value should be left alone by the bundler.
///
/// Anything carrying a scheme (`https:`, `data:`, `mailto:`), protocol-relative URLs,
/// fragment-only links and template bindings cannot be resolved to a file in the build.
pub fn should_ignore_asset_reference(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || external_reference_patterns()
            .iter()
            .any(|pattern| pattern.is_match(value))
}

//! Hidden-key filter

use glob::{MatchOptions, Pattern};

const SEPARATOR: char = '/';

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone, Debug)]
struct HidePattern {
    raw: String,
    glob: Option<Pattern>,
}

impl HidePattern {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            // An invalid glob only disables the glob rule for this pattern
            glob: Pattern::new(raw).ok(),
        }
    }

    fn matches(&self, key: &str) -> bool {
        let matched = if self.raw.contains(SEPARATOR) {
            key.strip_prefix(self.raw.as_str())
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
        } else {
            key.split(SEPARATOR)
                .any(|component| component == self.raw || self.glob_matches(component))
        };
        matched || self.glob_matches(key)
    }

    fn glob_matches(&self, candidate: &str) -> bool {
        self.glob
            .as_ref()
            .is_some_and(|glob| glob.matches_with(candidate, GLOB_OPTIONS))
    }
}

/// Compiled hide patterns.
///
/// A pattern without `/` hides any key with a path component equal to it or
/// matching it as a glob: `bar` hides `/bar` and `/foo/bar/baz` but not
/// `/barstool`, and `_*` hides `/_draft/x`. A pattern with `/`
/// hides keys it prefixes up to a separator: `/foo` hides `/foo/bar` but
/// not `/foobar`. Every pattern is also tried as a glob against the full
/// key, where `*` and `?` stop at `/`.
#[derive(Clone, Debug, Default)]
pub struct HideFilter {
    patterns: Vec<HidePattern>,
}

impl HideFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref())
                .filter(|p| !p.is_empty())
                .map(HidePattern::new)
                .collect(),
        }
    }

    /// True if any pattern matches the key by any rule
    pub fn is_hidden(&self, key: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(key))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// One-off check without keeping the compiled filter
pub fn is_hidden<S: AsRef<str>>(key: &str, patterns: &[S]) -> bool {
    HideFilter::new(patterns).is_hidden(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["foo.txt", "_*"], "/_draft", true)]
    #[case(&["foo.txt", "_*"], "/foo.txt", true)]
    #[case(&["foo.txt", "_*"], "/foobar", false)]
    #[case(&["bar"], "/bar", true)]
    #[case(&["bar"], "/foo/bar/baz", true)]
    #[case(&["bar"], "/barstool", false)]
    #[case(&["_*"], "/posts/_draft/a.md", true)]
    #[case(&["*.bak"], "/a/b.bak", true)]
    #[case(&["/foo"], "/foo/bar", true)]
    #[case(&["/foo"], "/foo", true)]
    #[case(&["/foo"], "/foobar", false)]
    #[case(&["/foo/*.bak"], "/foo/a.bak", true)]
    #[case(&["/foo/*.bak"], "/foo/x/a.bak", false)]
    #[case(&["/[ab]*"], "/apple", true)]
    #[case(&["/[ab]*"], "/cherry", false)]
    #[case(&["/docs/?.md"], "/docs/a.md", true)]
    #[case(&["/docs/?.md"], "/docs/ab.md", false)]
    #[case(&["[unclosed"], "/[unclosed", true)]
    #[case(&[], "/anything", false)]
    fn test_is_hidden(#[case] patterns: &[&str], #[case] key: &str, #[case] hidden: bool) {
        assert_eq!(is_hidden(key, patterns), hidden, "{patterns:?} vs {key}");
    }

    #[test]
    fn test_empty_patterns_ignored() {
        let filter = HideFilter::new(&["", ""]);
        assert!(filter.is_empty());
        assert!(!filter.is_hidden("/"));
    }

    proptest! {
        #[test]
        fn prefix_rule_respects_separator(
            dir in "[a-z]{1,8}",
            suffix in "[a-z]{1,8}",
            child in "[a-z]{1,8}",
        ) {
            let filter = HideFilter::new(&[format!("/{dir}")]);
            let child_key = format!("/{dir}/{child}");
            let sibling_key = format!("/{dir}{suffix}");
            prop_assert!(filter.is_hidden(&child_key));
            prop_assert!(!filter.is_hidden(&sibling_key));
        }
    }
}

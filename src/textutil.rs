//! Shared UTF-8-safe truncation helpers.
//!
//! Approval descriptions, content previews, and log lines all truncate text.
//! Byte slicing can panic when the cut falls inside a multi-byte character, so
//! truncation is centralized here and counts characters.

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// Short single-line preview used in status text and log messages.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    truncate_with_suffix(&flat, max_chars, "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_with_suffix("hello", 10, "..."), "hello");
    }

    #[test]
    fn truncate_exactly_at_limit_unchanged() {
        assert_eq!(truncate_with_suffix("hello", 5, "..."), "hello");
    }

    #[test]
    fn truncate_long_string_adds_suffix() {
        assert_eq!(truncate_with_suffix("xxxxxxxxxx", 5, "..."), "xxxxx...");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let out = truncate_with_suffix("ab🙂cd", 3, "...");
        assert_eq!(out, "ab🙂...");
    }

    #[test]
    fn preview_flattens_newlines() {
        assert_eq!(preview("a\nb", 10), "a b");
    }

    #[test]
    fn preview_truncates_long_text() {
        let out = preview(&"x".repeat(100), 8);
        assert_eq!(out, "xxxxxxxx...");
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn truncation_never_exceeds_limit_plus_suffix(
                text in ".*",
                max in 0usize..64
            ) {
                let out = truncate_with_suffix(&text, max, "...");
                prop_assert!(out.chars().count() <= max + 3);
            }
        }
    }
}

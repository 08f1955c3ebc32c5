use chrono::{DateTime, Utc};

/// Source of "now" for session decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Truncates to at most `max` characters, never splitting a code point.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Accepts only same-origin absolute paths as post-login redirect targets.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') && !path.contains("://") => path.to_string(),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn truncate_keeps_short_values() {
        assert_eq!(truncate_chars("curl/8.0", 255), "curl/8.0");
    }

    #[test]
    fn truncate_respects_multibyte_characters() {
        assert_eq!(truncate_chars("żółw", 2), "żó");
    }

    #[test]
    fn next_rejects_foreign_hosts() {
        assert_eq!(sanitize_next(Some("https://evil.example/")), "/");
        assert_eq!(sanitize_next(Some("//evil.example/")), "/");
        assert_eq!(sanitize_next(Some("/\\evil.example")), "/");
        assert_eq!(sanitize_next(None), "/");
        assert_eq!(sanitize_next(Some("/digests?page=2")), "/digests?page=2");
    }

    proptest! {
        #[test]
        fn truncate_is_bounded_prefix(value in ".{0,400}", max in 0usize..300) {
            let truncated = truncate_chars(&value, max);
            prop_assert!(truncated.chars().count() <= max);
            prop_assert!(value.starts_with(&truncated));
        }

        #[test]
        fn sanitized_next_is_always_local(next in ".{0,64}") {
            let sanitized = sanitize_next(Some(&next));
            prop_assert!(sanitized.starts_with('/'));
            prop_assert!(!sanitized.starts_with("//"));
        }
    }
}

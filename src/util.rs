//! Small shared helpers.

/// Truncate a string to at most `max_bytes` without splitting a character.
///
/// Returns a `&str` that is always valid UTF-8 and at most `max_bytes` long.
/// If the byte at `max_bytes` is inside a multi-byte character, the slice is
/// shortened to the preceding character boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backward to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cap a tool result before it re-enters the conversation.
///
/// Oversized results degrade model quality and crowd out the rest of the
/// history; the tail is replaced with an explicit truncation marker so the
/// model knows it is looking at a prefix.
pub fn cap_tool_result(result: &str, max_bytes: usize) -> String {
    if result.len() <= max_bytes {
        return result.to_string();
    }
    let head = truncate_utf8(result, max_bytes);
    format!(
        "{head}\n\n[... truncated: showing first {max_bytes} of {} bytes]",
        result.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_at_exact_boundary() {
        assert_eq!(truncate_utf8("hello", 5), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
    }

    #[test]
    fn test_truncate_respects_multibyte_chars() {
        // "héllo" — é is 2 bytes, so byte 2 falls mid-character
        let s = "héllo";
        let t = truncate_utf8(s, 2);
        assert_eq!(t, "h");
        assert!(t.len() <= 2);
    }

    #[test]
    fn test_cap_tool_result_adds_marker() {
        let long = "x".repeat(100);
        let capped = cap_tool_result(&long, 10);
        assert!(capped.starts_with("xxxxxxxxxx"));
        assert!(capped.contains("truncated"));
        assert!(capped.contains("100 bytes"));
    }

    #[test]
    fn test_cap_tool_result_passthrough() {
        assert_eq!(cap_tool_result("ok", 10), "ok");
    }
}

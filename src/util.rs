use reqwest::Url;

/// Parse "true"/"false"/"1"/"0" (and yes/no, on/off) from an env value.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host.trim().to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "[::1]"
                || normalized == "::1"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

/// Largest char boundary in `text` that is `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut index = index;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Number of UTF-16 code units in `text[..byte_offset]`.
pub fn utf16_offset(text: &str, byte_offset: usize) -> usize {
    let end = floor_char_boundary(text, byte_offset);
    text[..end].encode_utf16().count()
}

/// Shortens diagnostic snippets to at most `max_bytes`, on a char boundary.
pub fn truncate_for_log(text: &str, max_bytes: usize) -> &str {
    &text[..floor_char_boundary(text, max_bytes)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_flag_variants() {
        assert_eq!(parse_bool_flag("true".to_string()), Some(true));
        assert_eq!(parse_bool_flag(" 0 ".to_string()), Some(false));
        assert_eq!(parse_bool_flag("YES".to_string()), Some(true));
        assert_eq!(parse_bool_flag("off".to_string()), Some(false));
        assert_eq!(parse_bool_flag("maybe".to_string()), None);
    }

    #[test]
    fn test_is_local_endpoint_url_normalizes_case_and_space() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:3000/api/ai/market "));
        assert!(is_local_endpoint_url("https://127.0.0.1/api"));
        assert!(is_local_endpoint_url("http://0.0.0.0:3000"));
        assert!(!is_local_endpoint_url("https://evil-localhost.com/api"));
        assert!(!is_local_endpoint_url("not a url"));
    }

    #[test]
    fn test_utf16_offset_counts_surrogate_pairs() {
        let text = "a😀b";
        assert_eq!(utf16_offset(text, 0), 0);
        assert_eq!(utf16_offset(text, 1), 1);
        // the emoji is 4 bytes and 2 UTF-16 units
        assert_eq!(utf16_offset(text, 5), 3);
        assert_eq!(utf16_offset(text, text.len()), 4);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 2), "h");
        assert_eq!(truncate_for_log("abc", 10), "abc");
    }
}

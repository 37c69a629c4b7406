//! Shared utility functions.

/// The last `max_bytes` of `s` (or slightly fewer) starting on a UTF-8
/// character boundary.
///
/// Command output is capped this way: the newest lines are the ones a model
/// needs.
pub fn tail_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_ascii() {
        assert_eq!(tail_str("hello world", 5), "world");
    }

    #[test]
    fn tail_short_input_unchanged() {
        assert_eq!(tail_str("hi", 10), "hi");
        assert_eq!(tail_str("", 0), "");
    }

    #[test]
    fn tail_moves_past_split_character() {
        // three 3-byte characters
        let s = "あのね";
        assert_eq!(tail_str(s, 4), "ね");
        assert_eq!(tail_str(s, 6), "のね");
        assert_eq!(tail_str(s, 9), "あのね");
    }
}

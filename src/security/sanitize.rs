//! Control-character filtering for untrusted text.

/// Truncate `text` to `max_length` characters, drop control characters other
/// than newline and tab, and trim surrounding whitespace.
pub fn sanitize(text: &str, max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let filtered: String = text
        .chars()
        .take(max_length)
        .filter(|&c| is_permitted(c))
        .collect();

    filtered.trim().to_string()
}

fn is_permitted(c: char) -> bool {
    c == '\n' || c == '\t' || (c as u32 >= 32 && c as u32 != 127)
}

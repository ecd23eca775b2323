//! Splits sanitized content into TTS-friendly chunks.
//!
//! Grounded on `message_processor.py`'s `chunk_message`: prefers
//! sentence-terminator boundaries, falls back to a hard split at the limit
//! for any run with no boundary.

const TERMINATORS: &[char] = &['.', '!', '?', '\n', '。', '！', '？'];

/// Splits `text` into chunks of at most `limit` characters each, preferring
/// to break immediately after a sentence terminator. Order is preserved.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= limit {
            chunks.push(chars[start..].iter().collect::<String>().trim().to_string());
            break;
        }

        let window_end = start + limit;
        let boundary = chars[start..window_end]
            .iter()
            .rposition(|c| TERMINATORS.contains(c))
            .map(|idx| start + idx + 1);

        let split_at = boundary.unwrap_or(window_end);
        let chunk_text: String = chars[start..split_at].iter().collect::<String>().trim().to_string();
        if !chunk_text.is_empty() {
            chunks.push(chunk_text);
        }
        start = split_at;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk("hello.", 500), vec!["hello."]);
    }

    #[test]
    fn splits_at_sentence_boundary_when_possible() {
        let text = format!("{}. {}.", "a".repeat(490), "b".repeat(10));
        let chunks = chunk(&text, 500);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn force_splits_with_no_boundary() {
        let text = "a".repeat(1200);
        let chunks = chunk(&text, 500);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 500));
    }

    #[test]
    fn concatenation_reconstructs_original_modulo_trim() {
        let text = "A. ".repeat(200);
        let chunks = chunk(&text, 500);
        let joined: String = chunks.join(" ");
        assert_eq!(joined.replace(' ', ""), text.replace(' ', ""));
    }
}

/// Check if a word is a common stop word
pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by" |
        "a" | "an" | "is" | "are" | "was" | "were" | "be" | "been" | "being" | "have" | "has" |
        "had" | "do" | "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might" |
        "must" | "can" | "this" | "that" | "these" | "those" | "from" | "up" | "about" | "into" |
        "through" | "during" | "before" | "after" | "above" | "below"
    )
}

/// Text processing utilities
pub mod text {
    /// Truncate text to a maximum number of characters, breaking at a word
    /// boundary when one is available.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars).collect();
        match truncated.rfind(' ') {
            Some(last_space) if last_space > 0 => format!("{}...", &truncated[..last_space]),
            _ => format!("{}...", truncated),
        }
    }

    /// Lowercase, drop punctuation other than hyphens, collapse whitespace.
    pub fn clean_title(text: &str) -> String {
        text.chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

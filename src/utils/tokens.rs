/// Rough prompt-size estimator: ~4 characters per token. An approximation,
/// not a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

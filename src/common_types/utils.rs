use uuid::Uuid;

// Helper function to generate new UUID strings
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Bounded text preview used when embedding long content into prompts.
/// Appends an ellipsis only when the text was actually truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

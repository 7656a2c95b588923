//! Fixed prompt text: the capability preamble taught to the model on the
//! first turn, and the message templates used by the page-analysis flows.

/// Prepended to the first user turn so the model learns the navigation
/// command grammar. Stored as part of the message, not held separately.
pub const CAPABILITY_PREAMBLE: &str = r#"[SYSTEM CAPABILITY: You can control the browser! When you want to open a website, use this format: [OPEN_URL: https://example.com].
You can also naturally suggest websites by saying things like "I'll open https://example.com for you" or "Let me navigate to https://wikipedia.org" and the browser will automatically open them.
Be helpful and proactively open relevant websites when users ask for them.]

"#;

pub const TRUNCATION_MARKER: &str = "\n\n...(content truncated for length)";

pub fn page_analysis_message(url: &str, title: &str, content: &str) -> String {
    format!(
        "I'm currently viewing this webpage:\n\nURL: {}\nTitle: {}\n\nPage content:\n{}\n\nPlease analyze this page and tell me what it's about, including key information and main topics.",
        url, title, content
    )
}

pub fn screenshot_message(url: &str, title: &str) -> String {
    format!(
        "I'm viewing this webpage:\n\nURL: {}\nTitle: {}\n\nPlease analyze what you see in this screenshot. Describe the page layout, content, images, and any important information visible.",
        url, title
    )
}

pub fn welcome_message(model: &str) -> String {
    format!(
        "Hi! I'm a local AI running on your computer with Ollama. I'm completely free and private!\n\nCurrent model: {}\n\nI can help you browse the web and answer questions. Try asking me about the current page or anything else!\n\nI can also open websites for you - just ask me to visit any website and I'll navigate there automatically.",
        model
    )
}

/// Caps page text before it is folded into a prompt. Cuts on a char
/// boundary at or below `max_len` and appends the overflow marker.
pub fn truncate_content(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }
    let mut cut = max_len;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &content[..cut], TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_content_unchanged() {
        assert_eq!(truncate_content("short", 6000), "short");
    }

    #[test]
    fn test_truncate_long_content_marked() {
        let content = "x".repeat(7000);
        let truncated = truncate_content(&content, 6000);
        assert!(truncated.starts_with(&"x".repeat(6000)));
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncated.len(), 6000 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 'é' is two bytes; a naive cut at byte 3 would split the second one.
        let content = "ééé";
        let truncated = truncate_content(content, 3);
        assert!(truncated.starts_with('é'));
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_preamble_describes_command_grammar() {
        assert!(CAPABILITY_PREAMBLE.contains("[OPEN_URL: https://example.com]"));
        assert!(CAPABILITY_PREAMBLE.ends_with("\n\n"));
    }
}

use regex::Regex;

use crate::config::HeuristicsConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Tagged directive of the form [OPEN_URL: url].
    Directive,
    /// Bare URL the model mentioned next to an action verb.
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavCommand {
    pub url: String,
    pub origin: CommandOrigin,
}

/// Extracts navigation commands from an assistant reply. Two passes, both
/// pure functions of the input text and the heuristics config:
///
/// 1. Every [OPEN_URL: …] directive fires, in order of occurrence.
/// 2. Bare http(s) URLs fire only when an action verb appears in a window
///    around them, and only the first qualifying URL is taken so one reply
///    cannot trigger a cascade of navigations.
pub fn extract_nav_commands(message: &str, config: &HeuristicsConfig) -> Vec<NavCommand> {
    let mut commands = Vec::new();

    let directive_pattern = Regex::new(r"\[OPEN_URL:\s*([^\]]+)\]").unwrap();
    for capture in directive_pattern.captures_iter(message) {
        commands.push(NavCommand {
            url: capture[1].trim().to_string(),
            origin: CommandOrigin::Directive,
        });
    }

    let url_pattern = Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap();
    let message_lower = message.to_lowercase();

    for found in url_pattern.find_iter(message) {
        let url = found.as_str();
        let needle = url.to_lowercase();
        let Some(index) = message_lower.find(&needle) else {
            continue;
        };

        let start = floor_char_boundary(&message_lower, index.saturating_sub(config.window_before));
        let end = floor_char_boundary(
            &message_lower,
            (index + needle.len() + config.window_after).min(message_lower.len()),
        );
        let window = &message_lower[start..end];

        if config.action_verbs.iter().any(|verb| window.contains(verb.as_str())) {
            commands.push(NavCommand {
                url: url.to_string(),
                origin: CommandOrigin::Suggestion,
            });
            // Only the first suggested URL opens, to avoid overwhelming the user.
            break;
        }
    }

    commands
}

/// Prefixes https:// when the scheme is missing.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Turns free text typed into the address slot into a loadable URL: bare
/// hosts get a scheme, anything that doesn't look like a host becomes a
/// search query.
pub fn normalize_address_input(input: &str) -> String {
    let input = input.trim();
    let first_token = input.split_whitespace().next().unwrap_or("");

    if !input.starts_with("http") && !first_token.contains('.') {
        format!("https://www.google.com/search?q={}", input.replace(' ', "+"))
    } else if !input.starts_with("http") {
        format!("https://{}", input)
    } else {
        input.to_string()
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeuristicsConfig;

    fn config() -> HeuristicsConfig {
        HeuristicsConfig::default()
    }

    #[test]
    fn test_directive_extracted() {
        let commands = extract_nav_commands("[OPEN_URL: https://example.com]", &config());
        assert_eq!(commands[0].url, "https://example.com");
        assert_eq!(commands[0].origin, CommandOrigin::Directive);
    }

    #[test]
    fn test_directive_whitespace_trimmed() {
        let commands = extract_nav_commands("[OPEN_URL:   wikipedia.org  ]", &config());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].url, "wikipedia.org");
    }

    #[test]
    fn test_every_directive_fires() {
        let reply = "First [OPEN_URL: https://a.example] then [OPEN_URL: https://b.example] done.";
        let commands = extract_nav_commands(reply, &config());
        let directives: Vec<_> = commands
            .iter()
            .filter(|c| c.origin == CommandOrigin::Directive)
            .collect();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].url, "https://a.example");
        assert_eq!(directives[1].url, "https://b.example");
    }

    #[test]
    fn test_suggestion_with_action_verb() {
        let commands =
            extract_nav_commands("I'll open https://example.com for you", &config());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].url, "https://example.com");
        assert_eq!(commands[0].origin, CommandOrigin::Suggestion);
    }

    #[test]
    fn test_bare_url_without_verb_ignored() {
        let commands = extract_nav_commands("See https://example.com for details.", &config());
        assert!(commands.is_empty());
    }

    #[test]
    fn test_only_first_suggestion_fires() {
        let reply = "Let me open https://first.example and also visit https://second.example";
        let commands = extract_nav_commands(reply, &config());
        let suggestions: Vec<_> = commands
            .iter()
            .filter(|c| c.origin == CommandOrigin::Suggestion)
            .collect();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].url, "https://first.example");
    }

    #[test]
    fn test_verb_outside_window_does_not_qualify() {
        let padding = "x".repeat(200);
        let reply = format!("open {} https://example.com", padding);
        let commands = extract_nav_commands(&reply, &config());
        assert!(commands.is_empty());
    }

    #[test]
    fn test_verb_after_url_inside_window() {
        let commands = extract_nav_commands("https://example.com is worth opening", &config());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].origin, CommandOrigin::Suggestion);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let reply = "Let me open https://example.com and [OPEN_URL: https://other.example]";
        let first = extract_nav_commands(reply, &config());
        let second = extract_nav_commands(reply, &config());
        assert_eq!(first, second);
    }

    #[test]
    fn test_verb_match_is_case_insensitive() {
        let commands = extract_nav_commands("OPENING https://example.com now", &config());
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn test_custom_verb_set() {
        let custom = HeuristicsConfig {
            action_verbs: vec!["browse".to_string()],
            ..HeuristicsConfig::default()
        };
        assert!(extract_nav_commands("browse https://example.com", &custom).len() == 1);
        assert!(extract_nav_commands("open https://example.com", &custom).is_empty());
    }

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("wikipedia.org"), "https://wikipedia.org");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
    }

    #[test]
    fn test_normalize_address_input() {
        assert_eq!(
            normalize_address_input("rust tutorials"),
            "https://www.google.com/search?q=rust+tutorials"
        );
        assert_eq!(normalize_address_input("docs.rs"), "https://docs.rs");
        assert_eq!(
            normalize_address_input("https://docs.rs/regex"),
            "https://docs.rs/regex"
        );
    }

    #[test]
    fn test_window_handles_multibyte_text() {
        let reply = "préférez ouvrir — open https://example.com — très bien";
        let commands = extract_nav_commands(reply, &config());
        assert_eq!(commands.len(), 1);
    }
}

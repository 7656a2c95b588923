#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Ordered, append-only conversation history. The capability preamble is
/// folded into the first user turn of a fresh (or cleared) history so it
/// travels with the stored message.
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    preamble: String,
}

impl ConversationHistory {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            preamble: preamble.into(),
        }
    }

    pub fn push_user(&mut self, content: &str) {
        let content = if self.messages.is_empty() && !self.preamble.is_empty() {
            format!("{}{}", self.preamble, content)
        } else {
            content.to_string()
        };
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content,
        });
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.to_string(),
        });
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Renders the linear completion prompt: "User: …" / "Assistant: …" segments
/// in history order, terminated by the continuation cue. System entries are
/// not part of the wire prompt.
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        match msg.role {
            ChatRole::User => {
                prompt.push_str(&format!("User: {}\n\n", msg.content));
            }
            ChatRole::Assistant => {
                prompt.push_str(&format!("Assistant: {}\n\n", msg.content));
            }
            ChatRole::System => {}
        }
    }
    prompt.push_str("Assistant: ");
    prompt
}

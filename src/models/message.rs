use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Visible conversation, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append streamed text to the trailing assistant message
    pub fn append_to_reply(&mut self, text: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => {
                last.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Drop a trailing assistant turn that never received any text
    pub fn discard_empty_reply(&mut self) -> bool {
        match self.messages.last() {
            Some(last) if last.role == MessageRole::Assistant && last.content.is_empty() => {
                self.messages.pop();
                true
            }
            _ => false,
        }
    }

    /// Drop a trailing user turn for `prompt`, with any partial reply to it
    pub fn discard_exchange(&mut self, prompt: &str) -> bool {
        let is_prompt = |m: &ChatMessage| m.role == MessageRole::User && m.content == prompt;
        let keep = match self.messages.as_slice() {
            [.., user, reply] if is_prompt(user) && reply.role == MessageRole::Assistant => {
                self.messages.len() - 2
            }
            [.., user] if is_prompt(user) => self.messages.len() - 1,
            _ => return false,
        };
        self.messages.truncate(keep);
        true
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Plain-text rendering used for token counting
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_to_assistant() {
        let mut conversation = Conversation::new();
        assert!(!conversation.append_to_reply("x"));

        conversation.push(ChatMessage::user("hi"));
        assert!(!conversation.append_to_reply("x"));

        conversation.push(ChatMessage::assistant(""));
        assert!(conversation.append_to_reply("Hel"));
        assert!(conversation.append_to_reply("lo"));
        assert_eq!(conversation.last_reply(), Some("Hello"));
    }

    #[test]
    fn test_discard_empty_reply() {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::user("hi"));
        assert!(!conversation.discard_empty_reply());

        conversation.push(ChatMessage::assistant(""));
        assert!(conversation.discard_empty_reply());
        assert_eq!(conversation.len(), 1);

        conversation.push(ChatMessage::assistant("partial"));
        assert!(!conversation.discard_empty_reply());
    }

    #[test]
    fn test_discard_exchange() {
        let mut conversation = Conversation::new();
        assert!(!conversation.discard_exchange("first"));
        conversation.push(ChatMessage::user("first"));
        conversation.push(ChatMessage::assistant("done"));
        assert!(!conversation.discard_exchange("second"));

        conversation.push(ChatMessage::user("second"));
        assert!(!conversation.discard_exchange("other"));
        assert!(conversation.discard_exchange("second"));
        assert_eq!(conversation.len(), 2);

        conversation.push(ChatMessage::user("third"));
        conversation.push(ChatMessage::assistant("partial"));
        assert!(conversation.discard_exchange("third"));
        assert_eq!(conversation.last_reply(), Some("done"));
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_clear_twice_is_noop() {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::user("hi"));
        conversation.clear();
        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.transcript(), "");
    }
}

//! Provider-facing chat messages

use serde::{Deserialize, Serialize};

/// Role of a message in a provider conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(text);
    }

    fn prepend(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.content.is_empty() {
            self.content = text.to_string();
        } else {
            self.content = format!("{}\n\n{}", text, self.content);
        }
    }
}

/// Conversation builder that keeps user/assistant alternation.
///
/// Pushing a message with the same role as the previous one merges it into
/// the previous message instead of adding a consecutive turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        match self.messages.last_mut() {
            Some(last) if last.role == message.role => last.append(&message.content),
            _ => self.messages.push(message),
        }
    }

    /// Prepend `text` to the first user message, creating one if needed.
    pub fn prepend_to_first_user(&mut self, text: &str) {
        match self.messages.iter_mut().find(|m| m.role == Role::User) {
            Some(first) => first.prepend(text),
            None => self.messages.insert(0, Message::user(text)),
        }
    }

    /// Append `text` to the last message if it is a user message, otherwise
    /// open a new user turn.
    pub fn append_to_last_user(&mut self, text: &str) {
        self.push(Message::user(text));
    }

    /// Ensure the conversation opens with a user turn.
    pub fn ensure_user_first(&mut self, placeholder: &str) {
        if self
            .messages
            .first()
            .is_some_and(|m| m.role == Role::Assistant)
        {
            self.messages.insert(0, Message::user(placeholder));
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_role_messages_merge() {
        let mut conv = Conversation::new();
        conv.push(Message::user("a"));
        conv.push(Message::user("b"));
        conv.push(Message::assistant("c"));
        conv.push(Message::user("d"));

        let msgs = conv.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "a\n\nb");
        assert_eq!(msgs[2].content, "d");
    }

    #[test]
    fn test_append_to_last_user_never_adds_consecutive_user_turns() {
        let mut conv = Conversation::new();
        conv.push(Message::user("hello"));
        conv.append_to_last_user("refine");
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].content, "hello\n\nrefine");

        conv.push(Message::assistant("ok"));
        conv.append_to_last_user("next");
        assert_eq!(conv.messages().len(), 3);
    }

    #[test]
    fn test_prepend_to_first_user() {
        let mut conv = Conversation::new();
        conv.prepend_to_first_user("ace");
        assert_eq!(conv.messages()[0], Message::user("ace"));

        let mut conv = Conversation::new();
        conv.push(Message::assistant("x"));
        conv.push(Message::user("y"));
        conv.prepend_to_first_user("ace");
        assert_eq!(conv.messages()[1].content, "ace\n\ny");
    }

    #[test]
    fn test_ensure_user_first() {
        let mut conv = Conversation::new();
        conv.push(Message::assistant("x"));
        conv.ensure_user_first("(start)");
        assert_eq!(conv.messages()[0], Message::user("(start)"));
        assert_eq!(conv.messages().len(), 2);
    }
}

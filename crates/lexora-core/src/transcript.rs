//! The chat transcript: ordered user and assistant turns.

use std::fmt;

/// Identity of a message, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// A chat message in the conversation
#[derive(Debug, Clone)]
pub struct ChatMessage {
    id: MessageId,
    role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }
}

/// Insertion order is display order. Only content changes after a push.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            role,
            content: content.into(),
        });
        id
    }

    /// Swap in new content for `id`. Unknown ids (e.g. after a reset) are
    /// ignored and reported as `false`.
    pub fn replace_content(&mut self, id: MessageId, content: impl Into<String>) -> bool {
        // Streaming targets are almost always the newest entry
        match self.messages.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => {
                message.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

//! Conversation and request state shared by the TUI and the CLI commands.

use serde::{Deserialize, Serialize};

pub const GREETING: &str = "How would you like me to help you?";

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// The opening message every conversation starts with
    pub fn greeting() -> Self {
        Self::new(ChatRole::System, GREETING)
    }

    /// Only answers (system or assistant) can be liked or disliked
    pub fn is_rateable(&self) -> bool {
        matches!(self.role, ChatRole::System | ChatRole::Assistant)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Lifecycle of the in-flight question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Created,
    Pending,
    Successful,
    Failed,
}

impl RequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Created => "ready",
            RequestStatus::Pending => "answering",
            RequestStatus::Successful => "done",
            RequestStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Like => "like",
            Feedback::Dislike => "dislike",
        }
    }
}

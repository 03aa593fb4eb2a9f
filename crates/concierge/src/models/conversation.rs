use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use crate::errors::{AgentError, AgentResult};

/// A snapshot of a conversation as handed over by the caller
///
/// The assistant never stores conversations; callers persist whatever they get back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Start a new conversation from the initiating user message
    pub fn start<S: AsRef<str>>(text: S) -> AgentResult<Self> {
        let text = text.as_ref();
        if text.trim().is_empty() {
            return Err(AgentError::EmptyConversation);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            messages: vec![Message::user().with_text(text)],
        })
    }

    /// Wrap prior turns of an existing conversation
    pub fn from_messages<S: Into<String>>(id: S, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            title: None,
            messages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the assistant's answer once the caller accepted it
    pub fn push_reply<S: Into<String>>(&mut self, text: S) {
        self.messages.push(Message::assistant().with_text(text));
    }
}

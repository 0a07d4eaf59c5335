//! Effects produced by state transitions

use crate::conversation::Sender;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a message stamped with the current time
    AppendMessage { sender: Sender, text: String },

    /// Clear the staged draft in the presentation layer
    ClearDraft,

    /// Notify clients that the pending flag changed
    NotifyPending { pending: bool },

    /// Issue exactly one outbound completion call
    RequestCompletion { prompt: String },

    /// Empty the conversation
    ClearConversation,
}

impl Effect {
    pub fn append_user(text: impl Into<String>) -> Self {
        Effect::AppendMessage {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn append_assistant(text: impl Into<String>) -> Self {
        Effect::AppendMessage {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

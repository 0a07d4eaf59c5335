//! Events that drive the chat state machine

use crate::llm::RequestFailed;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage { text: String },
    Clear,

    // Completion events
    CompletionSucceeded { text: String },
    CompletionFailed { error: RequestFailed },
}

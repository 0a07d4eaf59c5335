//! API request and response types

use crate::conversation::Message;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for chat action. `accepted` is false for blank input.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub accepted: bool,
}

/// Full conversation view
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub messages: Vec<Message>,
    pub pending: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

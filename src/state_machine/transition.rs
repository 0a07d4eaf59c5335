//! Pure state transition function
//!
//! Given the same inputs it always produces the same outputs, with no I/O.
//! Timestamps are assigned when the controller executes `AppendMessage`.

use super::{AdmissionPolicy, ChatContext, ChatState, Effect, Event};
use crate::conversation::FALLBACK_REPLY;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Whether the transition did nothing at all
    pub fn is_noop(&self, previous: &ChatState) -> bool {
        self.effects.is_empty() && self.new_state == *previous
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A reply is still pending, wait for it before sending another message")]
    Busy,
    #[error("Completion settled while no request was in flight")]
    NothingInFlight,
}

pub fn transition(
    state: &ChatState,
    context: &ChatContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Whitespace-only input is ignored entirely
        (_, Event::UserMessage { text }) if text.trim().is_empty() => {
            Ok(TransitionResult::new(*state))
        }

        (ChatState::Idle, Event::UserMessage { text }) => Ok(TransitionResult::new(
            ChatState::Sending { in_flight: 1 },
        )
        .with_effects(submission_effects(text.trim(), true))),

        (ChatState::Sending { in_flight }, Event::UserMessage { text }) => {
            match context.admission {
                AdmissionPolicy::SingleSlot => Err(TransitionError::Busy),
                AdmissionPolicy::Overlap => Ok(TransitionResult::new(ChatState::Sending {
                    in_flight: in_flight.saturating_add(1),
                })
                .with_effects(submission_effects(text.trim(), false))),
            }
        }

        // clear() never touches the request state; in-flight replies still land
        (_, Event::Clear) => {
            Ok(TransitionResult::new(*state).with_effect(Effect::ClearConversation))
        }

        (ChatState::Sending { in_flight }, Event::CompletionSucceeded { text }) => {
            Ok(settle(*in_flight, Effect::append_assistant(text)))
        }

        (ChatState::Sending { in_flight }, Event::CompletionFailed { .. }) => {
            Ok(settle(*in_flight, Effect::append_assistant(FALLBACK_REPLY)))
        }

        (ChatState::Idle, Event::CompletionSucceeded { .. } | Event::CompletionFailed { .. }) => {
            Err(TransitionError::NothingInFlight)
        }
    }
}

fn submission_effects(text: &str, became_pending: bool) -> Vec<Effect> {
    let mut effects = vec![Effect::append_user(text), Effect::ClearDraft];
    if became_pending {
        effects.push(Effect::NotifyPending { pending: true });
    }
    effects.push(Effect::RequestCompletion {
        prompt: text.to_string(),
    });
    effects
}

fn settle(in_flight: u32, reply: Effect) -> TransitionResult {
    if in_flight <= 1 {
        TransitionResult::new(ChatState::Idle)
            .with_effect(reply)
            .with_effect(Effect::NotifyPending { pending: false })
    } else {
        TransitionResult::new(ChatState::Sending {
            in_flight: in_flight - 1,
        })
        .with_effect(reply)
    }
}

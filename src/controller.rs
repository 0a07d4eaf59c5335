//! Conversation controller
//!
//! Owns the conversation log and request state, runs the pure transition
//! function and executes the effects it returns. Each completion call runs
//! in its own task so it always settles, even when the caller stops waiting.

#[cfg(test)]
pub mod testing;

use crate::conversation::{Conversation, Message};
use crate::llm::{LlmRequest, LlmService, RequestFailed};
use crate::state_machine::{transition, ChatContext, ChatState, Effect, Event, TransitionError};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Controller type used by the server
pub type ProductionController = ConversationController<dyn LlmService>;

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Message { message: Message },
    Pending { pending: bool },
    DraftCleared,
    Cleared,
}

/// Point-in-time view of the conversation
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub pending: bool,
}

struct Session {
    state: ChatState,
    conversation: Conversation,
}

struct Shared<L: ?Sized> {
    context: ChatContext,
    session: Mutex<Session>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    llm: Arc<L>,
}

/// What a dispatched event did to the session
#[derive(Default)]
struct Applied {
    appended: Vec<Message>,
    requests: Vec<String>,
}

pub struct ConversationController<L: LlmService + ?Sized + 'static> {
    inner: Arc<Shared<L>>,
}

impl<L: LlmService + ?Sized + 'static> Clone for ConversationController<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle to a completion call started by [`ConversationController::begin`].
///
/// Dropping it does not cancel the call; the reply is still appended.
pub struct InFlight {
    handle: JoinHandle<Option<Message>>,
}

impl InFlight {
    /// Wait for the call to settle and return the assistant message it appended
    pub async fn settled(self) -> Option<Message> {
        match self.handle.await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Completion task did not finish");
                None
            }
        }
    }
}

impl<L: LlmService + ?Sized + 'static> ConversationController<L> {
    pub fn new(llm: Arc<L>, context: ChatContext) -> Self {
        let (broadcast_tx, _) = broadcast::channel(128);
        Self {
            inner: Arc::new(Shared {
                context,
                session: Mutex::new(Session {
                    state: ChatState::Idle,
                    conversation: Conversation::new(),
                }),
                broadcast_tx,
                llm,
            }),
        }
    }

    /// Submit `text` and wait until its reply (or the fallback) is appended.
    ///
    /// Returns `Ok(None)` when the trimmed text is empty and nothing happened.
    pub async fn submit(&self, text: &str) -> Result<Option<Message>, TransitionError> {
        match self.begin(text)? {
            Some(in_flight) => Ok(in_flight.settled().await),
            None => Ok(None),
        }
    }

    /// Append the user message, mark the session pending and start the call.
    ///
    /// Must be called within a tokio runtime.
    pub fn begin(&self, text: &str) -> Result<Option<InFlight>, TransitionError> {
        let applied = self.dispatch(Event::UserMessage {
            text: text.to_string(),
        })?;

        let Some(prompt) = applied.requests.into_iter().next() else {
            return Ok(None);
        };

        tracing::debug!(chars = prompt.chars().count(), "Submission accepted");

        let controller = self.clone();
        let handle = tokio::spawn(async move { controller.run_completion(prompt).await });
        Ok(Some(InFlight { handle }))
    }

    /// Empty the conversation. In-flight calls keep running and still append.
    pub fn clear(&self) {
        // Clear is accepted in every state
        if let Err(e) = self.dispatch(Event::Clear) {
            tracing::error!(error = %e, "Clear rejected");
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let session = self.lock();
        Snapshot {
            messages: session.conversation.messages().to_vec(),
            pending: session.state.is_pending(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().state.is_pending()
    }

    pub fn message_count(&self) -> usize {
        self.lock().conversation.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Subscribe and snapshot atomically so no event falls between the two
    pub fn subscribe_with_snapshot(&self) -> (Snapshot, broadcast::Receiver<SseEvent>) {
        let session = self.lock();
        let rx = self.inner.broadcast_tx.subscribe();
        let snapshot = Snapshot {
            messages: session.conversation.messages().to_vec(),
            pending: session.state.is_pending(),
        };
        (snapshot, rx)
    }

    async fn run_completion(&self, prompt: String) -> Option<Message> {
        let request = LlmRequest::new(prompt);
        let outcome = AssertUnwindSafe(self.inner.llm.complete(&request))
            .catch_unwind()
            .await;

        let event = match outcome {
            Ok(Ok(response)) => Event::CompletionSucceeded {
                text: response.text,
            },
            Ok(Err(error)) => Event::CompletionFailed { error },
            Err(_) => {
                tracing::error!("Completion service panicked, replying with fallback");
                Event::CompletionFailed {
                    error: RequestFailed::unknown("completion service panicked"),
                }
            }
        };

        match self.dispatch(event) {
            Ok(applied) => applied.appended.into_iter().next(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to settle completion");
                None
            }
        }
    }

    /// Run one transition and execute its effects under the session lock.
    ///
    /// `RequestCompletion` effects are returned to the caller, which issues
    /// them after the lock is released.
    fn dispatch(&self, event: Event) -> Result<Applied, TransitionError> {
        if let Event::CompletionFailed { error } = &event {
            tracing::warn!(kind = %error.kind, error = %error.message, "Replying with fallback");
        }

        let mut session = self.lock();
        let result = transition(&session.state, &self.inner.context, event)?;
        session.state = result.new_state;

        let mut applied = Applied::default();
        for effect in result.effects {
            match effect {
                Effect::AppendMessage { sender, text } => {
                    let message = Message::new(sender, text);
                    session.conversation.push(message.clone());
                    self.notify(SseEvent::Message {
                        message: message.clone(),
                    });
                    applied.appended.push(message);
                }
                Effect::ClearDraft => self.notify(SseEvent::DraftCleared),
                Effect::NotifyPending { pending } => self.notify(SseEvent::Pending { pending }),
                Effect::RequestCompletion { prompt } => applied.requests.push(prompt),
                Effect::ClearConversation => {
                    let dropped = session.conversation.len();
                    session.conversation.clear();
                    tracing::info!(dropped, in_flight = session.state.in_flight(), "Conversation cleared");
                    self.notify(SseEvent::Cleared);
                }
            }
        }

        Ok(applied)
    }

    fn notify(&self, event: SseEvent) {
        // No subscribers is fine
        let _ = self.inner.broadcast_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

//! Mock completion services and controller tests
//!
//! These mocks drive the controller without any network I/O.

use super::*;
use crate::conversation::{Sender, FALLBACK_REPLY};
use crate::llm::{LlmResponse, RequestFailed};
use crate::state_machine::AdmissionPolicy;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Mock Completion Services
// ============================================================================

/// Mock service that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, RequestFailed>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::new(text)));
    }

    pub fn queue_error(&self, error: RequestFailed) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RequestFailed::network("No mock response queued")))
    }

    fn service_id(&self) -> &str {
        "mock"
    }
}

/// Replies with the prompt itself
pub struct EchoLlmClient;

#[async_trait]
impl LlmService for EchoLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        Ok(LlmResponse::new(request.prompt.clone()))
    }

    fn service_id(&self) -> &str {
        "echo"
    }
}

/// Holds each request until the test releases the gate for its prompt,
/// then replies `reply to <prompt>`
pub struct GatedLlmClient {
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl GatedLlmClient {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, prompt: &str) -> Arc<Semaphore> {
        Arc::clone(
            self.gates
                .lock()
                .unwrap()
                .entry(prompt.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    pub fn release(&self, prompt: &str) {
        self.gate(prompt).add_permits(1);
    }
}

#[async_trait]
impl LlmService for GatedLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        let gate = self.gate(&request.prompt);
        let _permit = gate
            .acquire()
            .await
            .map_err(|e| RequestFailed::unknown(e.to_string()))?;
        Ok(LlmResponse::new(format!("reply to {}", request.prompt)))
    }

    fn service_id(&self) -> &str {
        "gated"
    }
}

/// Panics inside the call
pub struct PanickingLlmClient;

#[async_trait]
impl LlmService for PanickingLlmClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        panic!("completion service exploded");
    }

    fn service_id(&self) -> &str {
        "panicking"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn controller<L: LlmService + 'static>(llm: L) -> ConversationController<L> {
    ConversationController::new(Arc::new(llm), ChatContext::new(AdmissionPolicy::Overlap))
}

fn single_slot<L: LlmService + 'static>(llm: L) -> ConversationController<L> {
    ConversationController::new(Arc::new(llm), ChatContext::new(AdmissionPolicy::SingleSlot))
}

fn entries<L: LlmService + ?Sized + 'static>(ctrl: &ConversationController<L>) -> Vec<(String, Sender)> {
    ctrl.snapshot()
        .messages
        .into_iter()
        .map(|m| (m.text, m.sender))
        .collect()
}

fn entry(text: &str, sender: Sender) -> (String, Sender) {
    (text.to_string(), sender)
}

/// Poll `condition` until it holds or `timeout` elapses
async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

fn drain(rx: &mut broadcast::Receiver<SseEvent>) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    let ctrl = controller(EchoLlmClient);

    let reply = ctrl.submit("hello").await.unwrap().unwrap();
    assert_eq!(reply.text, "hello");
    assert_eq!(reply.sender, Sender::Assistant);

    assert_eq!(
        entries(&ctrl),
        vec![entry("hello", Sender::User), entry("hello", Sender::Assistant)]
    );
    assert!(!ctrl.is_pending());
}

#[tokio::test]
async fn test_blank_submit_changes_nothing() {
    let llm = Arc::new(MockLlmClient::new());
    let ctrl = ConversationController::new(Arc::clone(&llm), ChatContext::default());
    let mut rx = ctrl.subscribe();

    for text in ["", "   ", "\n\t"] {
        assert!(ctrl.submit(text).await.unwrap().is_none());
    }

    assert_eq!(ctrl.message_count(), 0);
    assert!(!ctrl.is_pending());
    assert!(llm.recorded_requests().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_submitted_text_is_trimmed_everywhere() {
    let llm = Arc::new(MockLlmClient::new());
    llm.queue_response("ok");
    let ctrl = ConversationController::new(Arc::clone(&llm), ChatContext::default());

    ctrl.submit("  what is rust?\n").await.unwrap();

    assert_eq!(llm.recorded_requests(), vec![LlmRequest::new("what is rust?")]);
    assert_eq!(ctrl.snapshot().messages[0].text, "what is rust?");
}

#[tokio::test]
async fn test_each_submit_adds_exactly_two_messages() {
    let ctrl = controller(EchoLlmClient);
    for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
        ctrl.submit(text).await.unwrap();
        assert_eq!(ctrl.message_count(), (i + 1) * 2);
    }
    let senders: Vec<_> = ctrl.snapshot().messages.iter().map(|m| m.sender).collect();
    assert_eq!(
        senders,
        vec![
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant
        ]
    );
}

#[tokio::test]
async fn test_pending_spans_the_call() {
    let llm = Arc::new(GatedLlmClient::new());
    let ctrl = ConversationController::new(Arc::clone(&llm), ChatContext::default());
    assert!(!ctrl.is_pending());

    let in_flight = ctrl.begin("hi").unwrap().unwrap();
    assert!(ctrl.is_pending());
    assert_eq!(entries(&ctrl), vec![entry("hi", Sender::User)]);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(ctrl.is_pending(), "still waiting on the gate");

    llm.release("hi");
    let reply = in_flight.settled().await.unwrap();
    assert_eq!(reply.text, "reply to hi");
    assert!(!ctrl.is_pending());
}

#[tokio::test]
async fn test_failure_appends_fallback() {
    let llm = MockLlmClient::new();
    llm.queue_error(RequestFailed::status("HTTP 500 Internal Server Error"));
    let ctrl = controller(llm);

    let reply = ctrl.submit("x").await.unwrap().unwrap();
    assert_eq!(reply.text, FALLBACK_REPLY);
    assert_eq!(
        entries(&ctrl),
        vec![entry("x", Sender::User), entry(FALLBACK_REPLY, Sender::Assistant)]
    );
    assert!(!ctrl.is_pending());
}

#[tokio::test]
async fn test_recovers_after_failure() {
    let llm = MockLlmClient::new();
    llm.queue_error(RequestFailed::malformed("No candidates in response"));
    llm.queue_response("fine now");
    let ctrl = controller(llm);

    ctrl.submit("first").await.unwrap();
    let reply = ctrl.submit("second").await.unwrap().unwrap();
    assert_eq!(reply.text, "fine now");
    assert_eq!(ctrl.message_count(), 4);
}

#[tokio::test]
async fn test_panicking_service_still_settles() {
    let ctrl = controller(PanickingLlmClient);

    let reply = ctrl.submit("boom").await.unwrap().unwrap();
    assert_eq!(reply.text, FALLBACK_REPLY);
    assert!(!ctrl.is_pending());

    // Controller keeps accepting submissions
    assert!(ctrl.begin("again").unwrap().is_some());
}

#[tokio::test]
async fn test_missing_configuration_uses_fallback() {
    let ctrl = controller(crate::llm::GeminiService::new(None, None));
    let reply = ctrl.submit("hello").await.unwrap().unwrap();
    assert_eq!(reply.text, FALLBACK_REPLY);
    assert!(!ctrl.is_pending());
}

#[tokio::test]
async fn test_notification_order() {
    let ctrl = controller(EchoLlmClient);
    let mut rx = ctrl.subscribe();

    ctrl.submit("hello").await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 5, "events: {events:?}");
    assert!(matches!(&events[0], SseEvent::Message { message } if message.sender == Sender::User));
    assert!(matches!(events[1], SseEvent::DraftCleared));
    assert!(matches!(events[2], SseEvent::Pending { pending: true }));
    assert!(
        matches!(&events[3], SseEvent::Message { message } if message.sender == Sender::Assistant)
    );
    assert!(matches!(events[4], SseEvent::Pending { pending: false }));
}

#[tokio::test]
async fn test_clear_empties_from_any_length() {
    let ctrl = controller(EchoLlmClient);
    ctrl.clear();
    assert_eq!(ctrl.message_count(), 0);

    ctrl.submit("a").await.unwrap();
    ctrl.submit("b").await.unwrap();
    assert_eq!(ctrl.message_count(), 4);

    let mut rx = ctrl.subscribe();
    ctrl.clear();
    assert_eq!(ctrl.message_count(), 0);
    assert!(!ctrl.is_pending());
    assert!(matches!(drain(&mut rx).as_slice(), [SseEvent::Cleared]));
}

/// clear() leaves an in-flight call alone; its reply lands in the emptied log
#[tokio::test]
async fn test_reply_after_clear_still_lands() {
    let llm = Arc::new(GatedLlmClient::new());
    let ctrl = ConversationController::new(Arc::clone(&llm), ChatContext::default());

    let in_flight = ctrl.begin("q").unwrap().unwrap();
    ctrl.clear();
    assert_eq!(ctrl.message_count(), 0);
    assert!(ctrl.is_pending());

    llm.release("q");
    in_flight.settled().await;

    assert_eq!(entries(&ctrl), vec![entry("reply to q", Sender::Assistant)]);
    assert!(!ctrl.is_pending());
}

/// Overlapping submissions: replies land in arrival order, not submit order
#[tokio::test]
async fn test_overlapping_replies_land_in_arrival_order() {
    let llm = Arc::new(GatedLlmClient::new());
    let ctrl = ConversationController::new(
        Arc::clone(&llm),
        ChatContext::new(AdmissionPolicy::Overlap),
    );

    let first = ctrl.begin("a").unwrap().unwrap();
    let second = ctrl.begin("b").unwrap().unwrap();
    assert!(ctrl.is_pending());

    llm.release("b");
    second.settled().await;
    assert!(ctrl.is_pending(), "a is still outstanding");

    llm.release("a");
    first.settled().await;
    assert!(!ctrl.is_pending());

    assert_eq!(
        entries(&ctrl),
        vec![
            entry("a", Sender::User),
            entry("b", Sender::User),
            entry("reply to b", Sender::Assistant),
            entry("reply to a", Sender::Assistant),
        ]
    );
}

#[tokio::test]
async fn test_single_slot_rejects_second_submit() {
    let llm = Arc::new(GatedLlmClient::new());
    let ctrl = ConversationController::new(
        Arc::clone(&llm),
        ChatContext::new(AdmissionPolicy::SingleSlot),
    );

    let first = ctrl.begin("a").unwrap().unwrap();
    let err = ctrl.begin("b").err().unwrap();
    assert_eq!(err, TransitionError::Busy);
    assert_eq!(entries(&ctrl), vec![entry("a", Sender::User)]);

    llm.release("a");
    first.settled().await;

    llm.release("b");
    ctrl.submit("b").await.unwrap();
    assert_eq!(ctrl.message_count(), 4);
}

#[tokio::test]
async fn test_single_slot_echo_sequence() {
    let ctrl = single_slot(EchoLlmClient);
    ctrl.submit("one").await.unwrap();
    ctrl.submit("two").await.unwrap();
    assert_eq!(ctrl.message_count(), 4);
}

#[tokio::test]
async fn test_dropped_handle_does_not_cancel() {
    let llm = Arc::new(GatedLlmClient::new());
    let ctrl = ConversationController::new(Arc::clone(&llm), ChatContext::default());

    drop(ctrl.begin("fire and forget").unwrap());
    llm.release("fire and forget");

    let probe = ctrl.clone();
    assert!(wait_until(Duration::from_secs(2), move || !probe.is_pending()).await);
    assert_eq!(
        entries(&ctrl)[1],
        entry("reply to fire and forget", Sender::Assistant)
    );
}

#[tokio::test]
async fn test_subscribe_with_snapshot_sees_later_events() {
    let ctrl = controller(EchoLlmClient);
    ctrl.submit("before").await.unwrap();

    let (snapshot, mut rx) = ctrl.subscribe_with_snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert!(!snapshot.pending);

    ctrl.submit("after").await.unwrap();
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SseEvent::Message { message } if message.text == "after")));
}

// ============================================================================
// End-to-end against a stub Gemini endpoint
// ============================================================================

mod stub_endpoint {
    use super::*;
    use crate::llm::GeminiService;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;

    async fn serve(status: StatusCode, body: &'static str) -> String {
        let router = Router::new().route(
            "/generate",
            post(move || async move { (status, body).into_response() }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/generate")
    }

    async fn gemini_controller(status: StatusCode, body: &'static str) -> ConversationController<GeminiService> {
        let url = serve(status, body).await;
        controller(GeminiService::new(Some("test-key".to_string()), Some(url)))
    }

    #[tokio::test]
    async fn test_http_500_yields_fallback() {
        let ctrl = gemini_controller(StatusCode::INTERNAL_SERVER_ERROR, "oops").await;
        ctrl.submit("x").await.unwrap();
        assert_eq!(
            entries(&ctrl),
            vec![entry("x", Sender::User), entry(FALLBACK_REPLY, Sender::Assistant)]
        );
        assert!(!ctrl.is_pending());
    }

    #[tokio::test]
    async fn test_empty_payload_yields_fallback() {
        let ctrl = gemini_controller(StatusCode::OK, "{}").await;
        ctrl.submit("x").await.unwrap();
        assert_eq!(
            entries(&ctrl),
            vec![entry("x", Sender::User), entry(FALLBACK_REPLY, Sender::Assistant)]
        );
    }

    #[tokio::test]
    async fn test_valid_payload_yields_reply() {
        let ctrl = gemini_controller(
            StatusCode::OK,
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi from the stub"}],"role":"model"}}]}"#,
        )
        .await;
        ctrl.submit("hello").await.unwrap();
        assert_eq!(
            entries(&ctrl),
            vec![
                entry("hello", Sender::User),
                entry("Hi from the stub", Sender::Assistant)
            ]
        );
    }
}

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rs_sqs_consumer::errors::{QueueOperation, TransportError};
use rs_sqs_consumer::message::{
    BatchRequest, MessageRef, OutgoingMessage, ProcessingOutcome, QueueMessage, ReceiptHandle,
};
use rs_sqs_consumer::receiver::MessageProcessor;
use rs_sqs_consumer::transport::QueueTransport;

pub const SOURCE_QUEUE: &str = "https://sqs.test.local/000000000000/orders";
pub const DEAD_LETTER_QUEUE: &str = "https://sqs.test.local/000000000000/orders-dlq";

/// Builds a delivery whose receipt handle is `rh-<id>`.
pub fn message(id: &str, body: &str) -> QueueMessage {
    QueueMessage::new(id, body, ReceiptHandle::new(format!("rh-{id}")))
}

#[derive(Default)]
struct State {
    pending: VecDeque<QueueMessage>,
    failing_receives: Option<u32>,
    receive_requests: Vec<i32>,
    sent: Vec<(String, OutgoingMessage)>,
    delete_attempts: Vec<String>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
    fail_sends: bool,
}

/// In-memory queue that records every call.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    /// Simulated long-poll wait when nothing is pending.
    empty_wait: Duration,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            state: Mutex::default(),
            empty_wait: Duration::from_millis(5),
        }
    }

    pub fn with_messages(messages: impl IntoIterator<Item = QueueMessage>) -> Self {
        let transport = Self::new();
        transport.push(messages);
        transport
    }

    pub fn push(&self, messages: impl IntoIterator<Item = QueueMessage>) {
        self.state.lock().unwrap().pending.extend(messages);
    }

    /// The next `count` receives fail; `u32::MAX` fails forever.
    pub fn fail_receives(&self, count: u32) {
        self.state.lock().unwrap().failing_receives = Some(count);
    }

    pub fn fail_delete(&self, receipt_handle: &str) {
        self.state.lock().unwrap().failing_deletes.insert(receipt_handle.to_string());
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn receive_requests(&self) -> Vec<i32> {
        self.state.lock().unwrap().receive_requests.clone()
    }

    /// Published `(queue_url, body)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(queue_url, message)| (queue_url.clone(), message.body.clone()))
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<(String, OutgoingMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().delete_attempts.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut deleted = self.state.lock().unwrap().deleted.clone();
        deleted.sort();
        deleted
    }
}

fn unavailable(operation: QueueOperation, queue_url: &str) -> TransportError {
    TransportError::Service {
        operation,
        queue_url: queue_url.to_string(),
        code: "ServiceUnavailable".to_string(),
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn send(&self, queue_url: &str, message: &OutgoingMessage) -> Result<MessageRef, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(unavailable(QueueOperation::Send, queue_url));
        }
        state.sent.push((queue_url.to_string(), message.clone()));
        Ok(MessageRef {
            message_id: format!("dlq-{}", state.sent.len()),
        })
    }

    async fn receive_batch(&self, request: &BatchRequest) -> Result<Vec<QueueMessage>, TransportError> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.receive_requests.push(request.max_messages);

            if let Some(remaining) = state.failing_receives {
                if remaining > 0 {
                    if remaining != u32::MAX {
                        state.failing_receives = Some(remaining - 1);
                    }
                    return Err(unavailable(QueueOperation::Receive, &request.queue_url));
                }
            }

            let take = (request.max_messages as usize).min(state.pending.len());
            state.pending.drain(..take).collect::<Vec<_>>()
        };

        if batch.is_empty() {
            tokio::time::sleep(self.empty_wait).await;
        }
        Ok(batch)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: ReceiptHandle) -> Result<(), TransportError> {
        let handle = receipt_handle.into_inner();
        let mut state = self.state.lock().unwrap();
        state.delete_attempts.push(handle.clone());
        if state.failing_deletes.contains(&handle) {
            return Err(unavailable(QueueOperation::Delete, queue_url));
        }
        state.deleted.push(handle);
        Ok(())
    }
}

/// Processor driven by the message body:
///
/// - `ok` succeeds
/// - `retry` fails retryably
/// - `fatal` fails terminally
/// - `panic` panics
/// - `sleep:<ms>` sleeps, then succeeds
#[derive(Default)]
pub struct ScriptedProcessor {
    started: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageProcessor for ScriptedProcessor {
    async fn process(&self, message: &QueueMessage) -> ProcessingOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        match message.body.as_str() {
            "ok" => ProcessingOutcome::Success,
            "retry" => ProcessingOutcome::retryable("downstream unavailable"),
            "fatal" => ProcessingOutcome::terminal("malformed order"),
            "panic" => panic!("processor exploded on {}", message.id),
            other => match other.strip_prefix("sleep:").and_then(|ms| ms.parse::<u64>().ok()) {
                Some(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    ProcessingOutcome::Success
                }
                None => ProcessingOutcome::terminal(format!("unknown script {other:?}")),
            },
        }
    }
}

/// Polls `condition` every 5ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

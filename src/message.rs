//! Domain types shared by the transport, the handler and processors.

use std::fmt;

/// Hard cap on messages per `ReceiveMessage` call imposed by SQS.
pub const MAX_BATCH_SIZE: i32 = 10;

/// Longest long-poll wait SQS accepts, in seconds.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// Opaque token authorizing deletion of one specific delivery.
///
/// Not `Clone`: deleting consumes the handle, so a single processing attempt
/// can issue at most one delete with it.
#[derive(PartialEq, Eq)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        ReceiptHandle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Handles are long and act as credentials; keep them out of logs.
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "ReceiptHandle({prefix}…)")
    }
}

/// One delivery of a message received from the queue.
#[derive(Debug)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    /// How many times this message has been received, including this delivery.
    pub receive_count: u32,
    /// Ordering group of a FIFO queue delivery.
    pub message_group_id: Option<String>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        QueueMessage {
            id: id.into(),
            body: body.into(),
            receipt_handle,
            receive_count: 1,
            message_group_id: None,
        }
    }

    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = receive_count;
        self
    }

    pub fn with_message_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self
    }

    /// True when the queue has delivered this message before.
    pub fn is_redelivery(&self) -> bool {
        self.receive_count > 1
    }
}

/// True for SQS FIFO queues, whose names must end in `.fifo`.
pub fn is_fifo_queue(queue_url: &str) -> bool {
    queue_url.ends_with(".fifo")
}

/// A message to publish.
///
/// FIFO queues reject sends without a group id, and without a deduplication
/// id unless content-based deduplication is enabled on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<String>) -> Self {
        OutgoingMessage {
            body: body.into(),
            message_group_id: None,
            deduplication_id: None,
        }
    }

    pub fn with_fifo(mut self, group_id: impl Into<String>, deduplication_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self.deduplication_id = Some(deduplication_id.into());
        self
    }
}

/// Reference to a message accepted by the queue on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub message_id: String,
}

/// Parameters of a single receive call, clamped to what SQS accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub queue_url: String,
    pub max_messages: i32,
    pub wait_time_seconds: i32,
}

impl BatchRequest {
    /// Builds a request, clamping `max_messages` into `1..=10` and
    /// `wait_time_seconds` into `0..=20` rather than rejecting them.
    pub fn new(queue_url: impl Into<String>, max_messages: i32, wait_time_seconds: i32) -> Self {
        BatchRequest {
            queue_url: queue_url.into(),
            max_messages: max_messages.clamp(1, MAX_BATCH_SIZE),
            wait_time_seconds: wait_time_seconds.clamp(0, MAX_WAIT_TIME_SECONDS),
        }
    }
}

/// Result of handing a message to a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Success,
    /// Transient failure; the message should be delivered again.
    RetryableFailure(String),
    /// The message can never be processed; it belongs in the dead-letter queue.
    TerminalFailure(String),
}

impl ProcessingOutcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        ProcessingOutcome::RetryableFailure(reason.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        ProcessingOutcome::TerminalFailure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Success => None,
            ProcessingOutcome::RetryableFailure(reason)
            | ProcessingOutcome::TerminalFailure(reason) => Some(reason),
        }
    }
}

/// What to do with a delivery once it has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Delete,
    LeaveForRedelivery,
    RouteToDeadLetter,
}

impl From<&ProcessingOutcome> for AckDecision {
    fn from(outcome: &ProcessingOutcome) -> Self {
        match outcome {
            ProcessingOutcome::Success => AckDecision::Delete,
            ProcessingOutcome::RetryableFailure(_) => AckDecision::LeaveForRedelivery,
            ProcessingOutcome::TerminalFailure(_) => AckDecision::RouteToDeadLetter,
        }
    }
}

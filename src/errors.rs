use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the consumer.
///
/// Only the variants produced by startup, configuration, exhausted polling and
/// shutdown are fatal for a process. Per-message and per-poll failures are
/// contained inside the receiver and never surface here.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Error that occurs during AWS SQS client initialization.
    ///
    /// This error typically happens when there are issues with AWS credentials,
    /// region configuration, or network connectivity during client setup.
    #[error("failed to initialize AWS SQS client: {0}")]
    InitializationError(String),

    /// The loaded configuration is unusable.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Polling failed `attempts` times in a row and the receiver gave up.
    #[error("receiving from {queue_url} failed {attempts} consecutive times: {last_error}")]
    PollRetriesExhausted {
        queue_url: String,
        attempts: u32,
        last_error: TransportError,
    },

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// The HTTP listener could not be bound or failed while serving.
    #[error("http server error: {0}")]
    Server(String),
}

impl ConsumerError {
    /// Process exit status: 1 when running work had to be cut off or abandoned,
    /// 2 when the process could not start properly.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConsumerError::Shutdown(_) | ConsumerError::PollRetriesExhausted { .. } => 1,
            ConsumerError::InitializationError(_)
            | ConsumerError::Configuration(_)
            | ConsumerError::Transport(_)
            | ConsumerError::Server(_) => 2,
        }
    }
}

/// Which remote queue call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    Send,
    Receive,
    Delete,
    GetAttributes,
}

impl std::fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueueOperation::Send => "SendMessage",
            QueueOperation::Receive => "ReceiveMessage",
            QueueOperation::Delete => "DeleteMessage",
            QueueOperation::GetAttributes => "GetQueueAttributes",
        };
        f.write_str(name)
    }
}

/// Failure of a remote queue call.
///
/// An empty receive is never a `TransportError`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("{operation} on {queue_url} timed out")]
    Timeout {
        operation: QueueOperation,
        queue_url: String,
    },

    /// The request never reached the service (DNS, connect, TLS, credentials resolution).
    #[error("{operation} on {queue_url} could not be dispatched: {message}")]
    Dispatch {
        operation: QueueOperation,
        queue_url: String,
        message: String,
    },

    /// The service answered with an error code.
    #[error("{operation} on {queue_url} rejected with {code}: {message}")]
    Service {
        operation: QueueOperation,
        queue_url: String,
        code: String,
        message: String,
    },

    /// The service answered but the response could not be understood.
    #[error("{operation} on {queue_url} returned an unreadable response: {message}")]
    Response {
        operation: QueueOperation,
        queue_url: String,
        message: String,
    },

    #[error("{operation} on {queue_url} failed: {message}")]
    Other {
        operation: QueueOperation,
        queue_url: String,
        message: String,
    },
}

impl TransportError {
    pub fn operation(&self) -> QueueOperation {
        match self {
            TransportError::Timeout { operation, .. }
            | TransportError::Dispatch { operation, .. }
            | TransportError::Service { operation, .. }
            | TransportError::Response { operation, .. }
            | TransportError::Other { operation, .. } => *operation,
        }
    }

    pub fn queue_url(&self) -> &str {
        match self {
            TransportError::Timeout { queue_url, .. }
            | TransportError::Dispatch { queue_url, .. }
            | TransportError::Service { queue_url, .. }
            | TransportError::Response { queue_url, .. }
            | TransportError::Other { queue_url, .. } => queue_url,
        }
    }

    /// Short label used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "timeout",
            TransportError::Dispatch { .. } => "dispatch",
            TransportError::Service { .. } => "service",
            TransportError::Response { .. } => "response",
            TransportError::Other { .. } => "other",
        }
    }
}

/// Executing an ack decision failed. The source message was not deleted and
/// will be redelivered once its visibility timeout elapses.
#[derive(Debug, Clone, Error)]
pub enum AckError {
    #[error("delete failed: {0}")]
    Delete(TransportError),

    #[error("dead-letter publish failed: {0}")]
    DeadLetterPublish(TransportError),

    /// The message was published to the dead-letter queue but removing it from
    /// the source queue failed, so a duplicate will be redelivered.
    #[error("dead-lettered as {dead_letter_id} but delete from source failed: {source}")]
    DeleteAfterDeadLetter {
        dead_letter_id: String,
        source: TransportError,
    },

    #[error("terminal failure but no dead-letter queue is configured")]
    NoDeadLetterQueue,
}

#[derive(Debug, Clone, Error)]
pub enum ShutdownError {
    /// In-flight work did not finish within the grace period and was abandoned.
    #[error("shutdown grace period of {grace:?} exceeded with {remaining} task(s) still running")]
    GraceExceeded { grace: Duration, remaining: usize },

    /// A drained component (for example the HTTP listener) did not stop in time.
    #[error("{what} did not stop within {grace:?}")]
    Timeout { what: &'static str, grace: Duration },
}

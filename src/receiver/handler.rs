use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, error, warn};

use super::functions::MessageProcessor;
use crate::errors::AckError;
use crate::message::{AckDecision, OutgoingMessage, ProcessingOutcome, QueueMessage, ReceiptHandle, is_fifo_queue};
use crate::transport::QueueTransport;

/// What actually happened to a delivery after its ack decision was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckAction {
    Deleted,
    /// No queue call was made; the message reappears after its visibility timeout.
    LeftForRedelivery,
    /// Published to the dead-letter queue, then deleted from the source.
    DeadLettered { dead_letter_id: String },
}

#[derive(Debug)]
pub struct MessageReport {
    pub message_id: String,
    pub outcome: ProcessingOutcome,
    pub decision: AckDecision,
    /// `Err` means the decision could not be carried out and the message was
    /// left un-acked.
    pub ack: Result<AckAction, AckError>,
    pub elapsed: Duration,
}

impl MessageReport {
    /// True when the delivery was removed from the source queue.
    pub fn is_removed(&self) -> bool {
        matches!(
            self.ack,
            Ok(AckAction::Deleted) | Ok(AckAction::DeadLettered { .. })
        )
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<MessageReport>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.count(|ack| matches!(ack, Ok(AckAction::Deleted)))
    }

    pub fn dead_lettered(&self) -> usize {
        self.count(|ack| matches!(ack, Ok(AckAction::DeadLettered { .. })))
    }

    pub fn left_for_redelivery(&self) -> usize {
        self.count(|ack| matches!(ack, Ok(AckAction::LeftForRedelivery)))
    }

    pub fn ack_failures(&self) -> usize {
        self.count(Result::is_err)
    }

    pub fn get(&self, message_id: &str) -> Option<&MessageReport> {
        self.reports.iter().find(|report| report.message_id == message_id)
    }

    fn count(&self, predicate: impl Fn(&Result<AckAction, AckError>) -> bool) -> usize {
        self.reports.iter().filter(|report| predicate(&report.ack)).count()
    }
}

/// Applies the processing policy of one source queue: run the processor,
/// decide the ack, execute it.
pub struct MessageHandler<T: QueueTransport> {
    transport: Arc<T>,
    queue_url: String,
    dead_letter_queue_url: Option<String>,
}

impl<T: QueueTransport> Clone for MessageHandler<T> {
    fn clone(&self) -> Self {
        MessageHandler {
            transport: Arc::clone(&self.transport),
            queue_url: self.queue_url.clone(),
            dead_letter_queue_url: self.dead_letter_queue_url.clone(),
        }
    }
}

impl<T: QueueTransport> MessageHandler<T> {
    pub fn new(transport: Arc<T>, queue_url: impl Into<String>, dead_letter_queue_url: Option<String>) -> Self {
        MessageHandler {
            transport,
            queue_url: queue_url.into(),
            dead_letter_queue_url,
        }
    }

    /// Handles every message of a batch concurrently. A failure on one message
    /// never affects the others.
    pub async fn process_batch<P>(&self, messages: Vec<QueueMessage>, processor: &P) -> BatchReport
    where
        P: MessageProcessor + ?Sized,
    {
        let reports = join_all(
            messages
                .into_iter()
                .map(|message| self.handle_message(message, processor)),
        )
        .await;
        BatchReport { reports }
    }

    /// Processes a single delivery and executes its ack decision.
    pub async fn handle_message<P>(&self, message: QueueMessage, processor: &P) -> MessageReport
    where
        P: MessageProcessor + ?Sized,
    {
        let started = Instant::now();
        let outcome = invoke_processor(processor, &message).await;
        let decision = AckDecision::from(&outcome);

        let QueueMessage {
            id,
            body,
            receipt_handle,
            receive_count,
            message_group_id,
        } = message;

        let ack = match decision {
            AckDecision::Delete => self
                .transport
                .delete(&self.queue_url, receipt_handle)
                .await
                .map(|()| AckAction::Deleted)
                .map_err(AckError::Delete),
            AckDecision::LeaveForRedelivery => Ok(AckAction::LeftForRedelivery),
            AckDecision::RouteToDeadLetter => {
                self.dead_letter(&id, body, message_group_id, receipt_handle)
                    .await
            }
        };

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        match (&outcome, &ack) {
            (_, Err(err)) => error!(
                message_id = %id,
                queue_url = %self.queue_url,
                receive_count,
                elapsed_ms,
                reason = outcome.reason().unwrap_or(""),
                error = %err,
                "ack failed, message left for redelivery"
            ),
            (ProcessingOutcome::Success, Ok(_)) => {
                debug!(message_id = %id, queue_url = %self.queue_url, elapsed_ms, "message processed")
            }
            (ProcessingOutcome::RetryableFailure(reason), Ok(_)) => warn!(
                message_id = %id,
                queue_url = %self.queue_url,
                receive_count,
                elapsed_ms,
                reason = %reason,
                "retryable failure, message left for redelivery"
            ),
            (ProcessingOutcome::TerminalFailure(reason), Ok(_)) => warn!(
                message_id = %id,
                queue_url = %self.queue_url,
                receive_count,
                elapsed_ms,
                reason = %reason,
                "terminal failure, message dead-lettered"
            ),
        }

        MessageReport {
            message_id: id,
            outcome,
            decision,
            ack,
            elapsed,
        }
    }

    /// Publishes to the dead-letter queue and only then deletes from the source.
    ///
    /// A FIFO dead-letter queue gets the source group (the message id when the
    /// source had none) and the source message id as deduplication id, so a
    /// redelivered terminal message is not dead-lettered twice.
    async fn dead_letter(
        &self,
        message_id: &str,
        body: String,
        message_group_id: Option<String>,
        receipt_handle: ReceiptHandle,
    ) -> Result<AckAction, AckError> {
        let Some(dead_letter_queue_url) = self.dead_letter_queue_url.as_deref() else {
            return Err(AckError::NoDeadLetterQueue);
        };

        let mut outgoing = OutgoingMessage::new(body);
        if is_fifo_queue(dead_letter_queue_url) {
            let group_id = message_group_id.unwrap_or_else(|| message_id.to_string());
            outgoing = outgoing.with_fifo(group_id, message_id);
        }

        let published = self
            .transport
            .send(dead_letter_queue_url, &outgoing)
            .await
            .map_err(AckError::DeadLetterPublish)?;
        debug!(
            message_id,
            dead_letter_id = %published.message_id,
            dead_letter_queue_url,
            "published to dead-letter queue"
        );

        match self.transport.delete(&self.queue_url, receipt_handle).await {
            Ok(()) => Ok(AckAction::DeadLettered {
                dead_letter_id: published.message_id,
            }),
            Err(source) => Err(AckError::DeleteAfterDeadLetter {
                dead_letter_id: published.message_id,
                source,
            }),
        }
    }
}

async fn invoke_processor<P>(processor: &P, message: &QueueMessage) -> ProcessingOutcome
where
    P: MessageProcessor + ?Sized,
{
    match AssertUnwindSafe(processor.process(message)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(message_id = %message.id, panic = %reason, "processor panicked");
            ProcessingOutcome::TerminalFailure(format!("processor panicked: {reason}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

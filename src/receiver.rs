use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::errors::{ConsumerError, ShutdownError};
use crate::lifecycle::{Shutdown, drain};
use crate::message::{BatchRequest, MAX_BATCH_SIZE, ProcessingOutcome};
use crate::transport::{QueueTransport, SqsTransport};

mod config;
mod functions;
mod handler;

pub use config::ReceiverConfig;
pub use functions::{MessageProcessor, ProcessorFunction};
pub use handler::{AckAction, BatchReport, MessageHandler, MessageReport};

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Dispatching,
    Draining,
    Stopped,
}

/// Totals over the lifetime of one [`QueueReceiver::run`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub deleted: usize,
    pub dead_lettered: usize,
    pub left_for_redelivery: usize,
    pub ack_failures: usize,
    /// Tasks cut off at the end of the grace period; their messages were not deleted.
    pub abandoned: usize,
}

impl DrainReport {
    fn record(&mut self, joined: Result<MessageReport, JoinError>) {
        match joined {
            Ok(report) => {
                self.processed += 1;
                match report.ack {
                    Ok(AckAction::Deleted) => self.deleted += 1,
                    Ok(AckAction::DeadLettered { .. }) => self.dead_lettered += 1,
                    Ok(AckAction::LeftForRedelivery) => self.left_for_redelivery += 1,
                    Err(_) => self.ack_failures += 1,
                }
            }
            Err(err) if err.is_cancelled() => self.abandoned += 1,
            Err(err) => error!(error = %err, "message task failed"),
        }
    }
}

/// Polls one queue and dispatches each message to a processor.
///
/// At most `max_in_flight` messages are processed at once. The next receive is
/// issued as soon as there is spare capacity, without waiting for the previous
/// batch to finish.
pub struct QueueReceiver<T, P>
where
    T: QueueTransport,
    P: MessageProcessor + ?Sized,
{
    transport: Arc<T>,
    handler: MessageHandler<T>,
    processor: Arc<P>,
    config: ReceiverConfig,
    shutdown: Shutdown,
    state: WorkerState,
}

impl<T, P> QueueReceiver<T, P>
where
    T: QueueTransport,
    P: MessageProcessor + ?Sized,
{
    pub fn new(transport: Arc<T>, processor: Arc<P>, config: ReceiverConfig, shutdown: Shutdown) -> Self {
        let handler = MessageHandler::new(
            Arc::clone(&transport),
            config.queue_url.clone(),
            config.dead_letter_queue_url.clone(),
        );
        QueueReceiver {
            transport,
            handler,
            processor,
            config,
            shutdown,
            state: WorkerState::Idle,
        }
    }

    /// Runs until shutdown is triggered, then drains in-flight messages for at
    /// most the configured grace period.
    ///
    /// Returns an error when receive calls kept failing past the retry policy
    /// (shutdown is triggered for every other component as well) or when
    /// messages were still running at the end of the grace period.
    pub async fn run(mut self) -> Result<DrainReport, ConsumerError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let batch_size = self.config.max_number_of_messages.clamp(1, MAX_BATCH_SIZE) as usize;
        let mut in_flight: JoinSet<MessageReport> = JoinSet::new();
        let mut report = DrainReport::default();
        let mut consecutive_failures: u32 = 0;
        let mut escalation: Option<ConsumerError> = None;

        info!(
            queue_url = %self.config.queue_url,
            dead_letter_queue_url = self.config.dead_letter_queue_url.as_deref().unwrap_or("none"),
            max_in_flight = self.config.max_in_flight,
            batch_size,
            wait_time_seconds = self.config.wait_time_seconds,
            "receiver started"
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                report.record(joined);
            }

            if self.shutdown.is_triggered() {
                break;
            }

            // Only ask the queue for as many messages as can start right away.
            let first = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let Ok(first) = first else { break };
            let mut permits: Vec<OwnedSemaphorePermit> = vec![first];
            while permits.len() < batch_size {
                match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            let request = BatchRequest::new(
                self.config.queue_url.clone(),
                permits.len() as i32,
                self.config.wait_time_seconds,
            );
            self.transition(WorkerState::Polling);

            // A receive abandoned here hands out nothing; anything it would
            // have returned becomes visible again on its own.
            let received = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                result = self.transport.receive_batch(&request) => result,
            };

            match received {
                Ok(messages) => {
                    if consecutive_failures > 0 {
                        info!(
                            queue_url = %self.config.queue_url,
                            previous_failures = consecutive_failures,
                            "receive recovered"
                        );
                        consecutive_failures = 0;
                    }
                    if messages.is_empty() {
                        debug!(queue_url = %self.config.queue_url, "no messages available");
                        // A short poll returns at once on an empty queue.
                        if request.wait_time_seconds == 0 {
                            drop(permits);
                            tokio::select! {
                                _ = tokio::time::sleep(self.config.empty_poll_delay) => {}
                                _ = self.shutdown.wait() => break,
                            }
                        }
                        continue;
                    }
                    if messages.len() > permits.len() {
                        warn!(
                            queue_url = %self.config.queue_url,
                            requested = permits.len(),
                            received = messages.len(),
                            "queue returned more messages than requested, extras left for redelivery"
                        );
                    }

                    self.transition(WorkerState::Dispatching);
                    for (message, permit) in messages.into_iter().zip(permits) {
                        let handler = self.handler.clone();
                        let processor = Arc::clone(&self.processor);
                        in_flight.spawn(async move {
                            let _permit = permit;
                            handler.handle_message(message, processor.as_ref()).await
                        });
                    }
                }
                Err(err) => {
                    drop(permits);
                    consecutive_failures = consecutive_failures.saturating_add(1);

                    if !self.config.retry.should_retry(consecutive_failures) {
                        error!(
                            queue_url = %self.config.queue_url,
                            error_kind = err.kind(),
                            error = %err,
                            consecutive_failures,
                            "receive keeps failing, giving up and shutting down"
                        );
                        escalation = Some(ConsumerError::PollRetriesExhausted {
                            queue_url: self.config.queue_url.clone(),
                            attempts: consecutive_failures,
                            last_error: err,
                        });
                        self.shutdown.trigger();
                        break;
                    }

                    let backoff = self.config.retry.delay_for(consecutive_failures - 1);
                    warn!(
                        queue_url = %self.config.queue_url,
                        error_kind = err.kind(),
                        error = %err,
                        consecutive_failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "receive failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.wait() => break,
                    }
                }
            }
        }

        self.transition(WorkerState::Draining);
        let grace = self.config.shutdown_grace_period;
        if !in_flight.is_empty() {
            info!(
                queue_url = %self.config.queue_url,
                in_flight = in_flight.len(),
                grace_ms = grace.as_millis() as u64,
                "draining in-flight messages"
            );
        }

        let drained = drain(
            "in-flight messages",
            async {
                while let Some(joined) = in_flight.join_next().await {
                    report.record(joined);
                }
            },
            grace,
        )
        .await;

        if drained.is_err() {
            warn!(
                queue_url = %self.config.queue_url,
                still_running = in_flight.len(),
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed, abandoning in-flight messages; they will be redelivered"
            );
            // Tasks that complete before the abort lands are recorded normally.
            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next().await {
                report.record(joined);
            }
        }

        self.transition(WorkerState::Stopped);
        info!(
            queue_url = %self.config.queue_url,
            processed = report.processed,
            deleted = report.deleted,
            dead_lettered = report.dead_lettered,
            left_for_redelivery = report.left_for_redelivery,
            ack_failures = report.ack_failures,
            abandoned = report.abandoned,
            "receiver stopped"
        );

        if let Some(err) = escalation {
            return Err(err);
        }
        if report.abandoned > 0 {
            return Err(ShutdownError::GraceExceeded {
                grace,
                remaining: report.abandoned,
            }
            .into());
        }
        Ok(report)
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(queue_url = %self.config.queue_url, from = ?self.state, to = ?next, "worker state");
            self.state = next;
        }
    }
}

/// Polls `queue_url` with default settings, handing each message body and a
/// clone of `shared_resources` to `rv_fn`, until `shutdown` is triggered.
///
/// ```rust,no_run
/// use rs_sqs_consumer::{client::create_sqs_client_from_env, lifecycle::Shutdown};
/// use rs_sqs_consumer::message::ProcessingOutcome;
/// use rs_sqs_consumer::receiver::start_receive_queue;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = create_sqs_client_from_env().await;
/// let shutdown = Shutdown::new();
/// start_receive_queue(
///     client,
///     "https://sqs.us-east-1.amazonaws.com/123456789012/orders",
///     "shared state".to_string(),
///     |body, shared| async move {
///         println!("{shared}: {body}");
///         ProcessingOutcome::Success
///     },
///     shutdown,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_receive_queue<F, Fut, TShared>(
    sqs_client: aws_sdk_sqs::Client,
    queue_url: &str,
    shared_resources: TShared,
    rv_fn: F,
    shutdown: Shutdown,
) -> Result<DrainReport, ConsumerError>
where
    F: Fn(String, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessingOutcome> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    let transport = Arc::new(SqsTransport::new(sqs_client));
    let processor = Arc::new(ProcessorFunction::new(rv_fn, shared_resources));
    QueueReceiver::new(transport, processor, ReceiverConfig::new(queue_url), shutdown)
        .run()
        .await
}

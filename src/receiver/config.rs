use std::time::Duration;

use crate::message::{MAX_BATCH_SIZE, MAX_WAIT_TIME_SECONDS};
use crate::retry::RetryPolicy;

/// Configuration for a queue receiver.
///
/// # Fields
/// - `queue_url`: The source queue to poll.
/// - `dead_letter_queue_url`: Destination for terminally failed messages.
/// - `max_number_of_messages`: The maximum number of messages to receive in a single request.
/// - `wait_time_seconds`: The wait time for long polling, in seconds.
/// - `max_in_flight`: Upper bound on messages being processed at once, across polls.
/// - `shutdown_grace_period`: How long in-flight messages may run after shutdown starts.
/// - `retry`: Backoff applied when a receive call fails.
/// - `empty_poll_delay`: Pause after an empty short poll (`wait_time_seconds == 0`).
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub queue_url: String,

    pub dead_letter_queue_url: Option<String>,

    /// The maximum number of messages to receive in a single request.
    pub max_number_of_messages: i32,

    /// The wait time for long polling, in seconds.
    pub wait_time_seconds: i32,

    pub max_in_flight: usize,

    pub shutdown_grace_period: Duration,

    pub retry: RetryPolicy,

    pub empty_poll_delay: Duration,
}

impl ReceiverConfig {
    pub fn new(queue_url: impl Into<String>) -> Self {
        ReceiverConfig {
            queue_url: queue_url.into(),
            dead_letter_queue_url: None,
            max_number_of_messages: MAX_BATCH_SIZE,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            max_in_flight: 10,
            shutdown_grace_period: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            empty_poll_delay: Duration::from_secs(1),
        }
    }

    pub fn with_dead_letter_queue(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_queue_url = Some(url.into());
        self
    }

    pub fn with_batch(mut self, max_number_of_messages: i32, wait_time_seconds: i32) -> Self {
        self.max_number_of_messages = max_number_of_messages;
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    /// Zero is raised to one so the loop can always make progress.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = grace;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_empty_poll_delay(mut self, delay: Duration) -> Self {
        self.empty_poll_delay = delay;
        self
    }
}

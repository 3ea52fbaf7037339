//! # SQS Consumer
//!
//! An asynchronous AWS SQS consumption pipeline: long-poll a queue, dispatch
//! each message to a processor with bounded concurrency, acknowledge according
//! to the outcome, and drain cleanly on shutdown.
//!
//! ## Features
//!
//! - Bounded in-flight concurrency; polling overlaps with processing
//! - Outcome-driven acknowledgment: delete on success, leave for redelivery on
//!   retryable failure, dead-letter then delete on terminal failure
//! - Processor panics are isolated and treated as terminal failures
//! - Exponential backoff on failed receives instead of exiting
//! - Signal-driven graceful drain with a bounded grace period, shared by the
//!   worker and the HTTP listener
//!
//! Delivery is at-least-once. Processors must tolerate duplicates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rs_sqs_consumer::{client::create_sqs_client_from_env, lifecycle, receiver::start_receive_queue};
//! use rs_sqs_consumer::message::ProcessingOutcome;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_sqs_client_from_env().await;
//!     let queue_url = "https://sqs.region.amazonaws.com/account/queue-name";
//!     let shutdown = lifecycle::Shutdown::new();
//!     lifecycle::spawn_signal_listener(shutdown.clone())?;
//!
//!     start_receive_queue(
//!         client,
//!         queue_url,
//!         "shared state".to_string(),
//!         |message, shared| async move {
//!             println!("Processing message: {} with shared: {}", message, shared);
//!             ProcessingOutcome::Success
//!         },
//!         shutdown,
//!     )
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod message;
pub mod receiver;
pub mod retry;
pub mod settings;
pub mod transport;

use async_trait::async_trait;
use std::future::Future;

use crate::message::{ProcessingOutcome, QueueMessage};

/// Business logic applied to each received message.
///
/// Delivery is at-least-once: the same message may be processed more than once
/// (for example after a crash between processing and delete), so
/// implementations must be idempotent. No ordering between messages is
/// guaranteed.
///
/// A panic inside `process` is caught by the handler and treated as a
/// terminal failure.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    async fn process(&self, message: &QueueMessage) -> ProcessingOutcome;
}

/// Adapts a plain async function plus a shared resource into a
/// [`MessageProcessor`].
///
/// # Type Parameters
///
/// * `F` - The message handler function type
/// * `Fut` - The future returned by the handler function
/// * `TShared` - The type of shared resources passed to the handler
///
/// ```rust
/// use rs_sqs_consumer::message::ProcessingOutcome;
/// use rs_sqs_consumer::receiver::ProcessorFunction;
///
/// let processor = ProcessorFunction::new(
///     |body: String, prefix: String| async move {
///         if body.starts_with(&prefix) {
///             ProcessingOutcome::Success
///         } else {
///             ProcessingOutcome::terminal("unexpected prefix")
///         }
///     },
///     "order:".to_string(),
/// );
/// # let _ = processor;
/// ```
pub struct ProcessorFunction<F, Fut, TShared>
where
    F: Fn(String, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessingOutcome> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    rv_fn: F,
    shared_resources: TShared,
}

impl<F, Fut, TShared> ProcessorFunction<F, Fut, TShared>
where
    F: Fn(String, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessingOutcome> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    pub fn new(rv_fn: F, shared_resources: TShared) -> Self {
        ProcessorFunction {
            rv_fn,
            shared_resources,
        }
    }
}

#[async_trait]
impl<F, Fut, TShared> MessageProcessor for ProcessorFunction<F, Fut, TShared>
where
    F: Fn(String, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessingOutcome> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    async fn process(&self, message: &QueueMessage) -> ProcessingOutcome {
        (self.rv_fn)(message.body.clone(), self.shared_resources.clone()).await
    }
}

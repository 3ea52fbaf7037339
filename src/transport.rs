//! Request/response wrapper over the remote queue API.

use std::fmt;

use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use tracing::{debug, warn};

use crate::errors::{QueueOperation, TransportError};
use crate::message::{BatchRequest, MessageRef, OutgoingMessage, QueueMessage, ReceiptHandle};

/// The three queue calls the pipeline needs.
///
/// Implementations must be safe to share between concurrently running
/// message tasks.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Publishes `message` to `queue_url`.
    async fn send(&self, queue_url: &str, message: &OutgoingMessage) -> Result<MessageRef, TransportError>;

    /// Receives up to `request.max_messages` messages. No messages is `Ok(vec![])`.
    async fn receive_batch(&self, request: &BatchRequest) -> Result<Vec<QueueMessage>, TransportError>;

    /// Deletes the delivery identified by `receipt_handle`.
    async fn delete(&self, queue_url: &str, receipt_handle: ReceiptHandle) -> Result<(), TransportError>;
}

/// [`QueueTransport`] backed by the AWS SDK.
#[derive(Clone)]
pub struct SqsTransport {
    client: aws_sdk_sqs::Client,
}

impl SqsTransport {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        SqsTransport { client }
    }
}

impl fmt::Debug for SqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn send(&self, queue_url: &str, message: &OutgoingMessage) -> Result<MessageRef, TransportError> {
        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(&message.body)
            .set_message_group_id(message.message_group_id.clone())
            .set_message_deduplication_id(message.deduplication_id.clone())
            .send()
            .await
            .map_err(|err| classify_sdk_error(QueueOperation::Send, queue_url, err))?;

        let message_id = output.message_id().ok_or_else(|| TransportError::Response {
            operation: QueueOperation::Send,
            queue_url: queue_url.to_string(),
            message: "response carried no message id".to_string(),
        })?;

        Ok(MessageRef {
            message_id: message_id.to_string(),
        })
    }

    async fn receive_batch(&self, request: &BatchRequest) -> Result<Vec<QueueMessage>, TransportError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_system_attribute_names(MessageSystemAttributeName::MessageGroupId)
            .send()
            .await
            .map_err(|err| classify_sdk_error(QueueOperation::Receive, &request.queue_url, err))?;

        let messages = output.messages.unwrap_or_default();
        debug!(
            queue_url = %request.queue_url,
            requested = request.max_messages,
            received = messages.len(),
            "receive completed"
        );
        Ok(messages
            .into_iter()
            .filter_map(|message| into_queue_message(&request.queue_url, message))
            .collect())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: ReceiptHandle) -> Result<(), TransportError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle.into_inner())
            .send()
            .await
            .map_err(|err| classify_sdk_error(QueueOperation::Delete, queue_url, err))?;
        Ok(())
    }
}

fn into_queue_message(queue_url: &str, message: Message) -> Option<QueueMessage> {
    let id = message.message_id().unwrap_or("unknown").to_string();
    let Some(receipt_handle) = message.receipt_handle() else {
        warn!(queue_url, message_id = %id, "received message without receipt handle, skipping");
        return None;
    };
    let attributes = message.attributes();
    let receive_count = attributes
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse::<u32>().ok())
        .unwrap_or(1);

    let mut queue_message = QueueMessage::new(
        id,
        message.body().unwrap_or_default(),
        ReceiptHandle::new(receipt_handle),
    )
    .with_receive_count(receive_count);
    if let Some(group_id) = attributes.and_then(|attrs| attrs.get(&MessageSystemAttributeName::MessageGroupId)) {
        queue_message = queue_message.with_message_group_id(group_id);
    }
    Some(queue_message)
}

/// Maps an SDK failure onto [`TransportError`], keeping the service error code
/// when there is one.
pub(crate) fn classify_sdk_error<E, R>(
    operation: QueueOperation,
    queue_url: &str,
    err: SdkError<E, R>,
) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let queue_url = queue_url.to_string();
    match &err {
        SdkError::TimeoutError(_) => TransportError::Timeout { operation, queue_url },
        SdkError::DispatchFailure(_) => TransportError::Dispatch {
            operation,
            queue_url,
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ResponseError(_) => TransportError::Response {
            operation,
            queue_url,
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ServiceError(ctx) => TransportError::Service {
            operation,
            queue_url,
            code: ctx.err().code().unwrap_or("Unknown").to_string(),
            message: ctx.err().message().unwrap_or_default().to_string(),
        },
        _ => TransportError::Other {
            operation,
            queue_url,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

//! Order and payment events consumed by the worker.

use async_trait::async_trait;
use rs_sqs_consumer::message::{ProcessingOutcome, QueueMessage};
use rs_sqs_consumer::receiver::MessageProcessor;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: String,
        customer_id: String,
        total_cents: i64,
    },
    Paid {
        order_id: String,
        payment_id: String,
        amount_cents: i64,
    },
    Cancelled {
        order_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Refunded {
        order_id: String,
        payment_id: String,
        amount_cents: i64,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::Created { order_id, .. }
            | OrderEvent::Paid { order_id, .. }
            | OrderEvent::Cancelled { order_id, .. }
            | OrderEvent::Refunded { order_id, .. } => order_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Created { .. } => "created",
            OrderEvent::Paid { .. } => "paid",
            OrderEvent::Cancelled { .. } => "cancelled",
            OrderEvent::Refunded { .. } => "refunded",
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.order_id().trim().is_empty() {
            return Err("order_id is empty".to_string());
        }
        match self {
            OrderEvent::Created { total_cents, .. } if *total_cents < 0 => {
                Err(format!("negative order total {total_cents}"))
            }
            OrderEvent::Paid { amount_cents, .. } | OrderEvent::Refunded { amount_cents, .. }
                if *amount_cents <= 0 =>
            {
                Err(format!("non-positive amount {amount_cents}"))
            }
            _ => Ok(()),
        }
    }
}

/// Decodes and validates order events. Undecodable or invalid events can
/// never succeed and are classified as terminal.
#[derive(Debug, Default)]
pub struct OrderEventProcessor;

#[async_trait]
impl MessageProcessor for OrderEventProcessor {
    async fn process(&self, message: &QueueMessage) -> ProcessingOutcome {
        let event: OrderEvent = match serde_json::from_str(&message.body) {
            Ok(event) => event,
            Err(err) => return ProcessingOutcome::terminal(format!("undecodable order event: {err}")),
        };
        if let Err(reason) = event.validate() {
            return ProcessingOutcome::terminal(reason);
        }

        info!(
            message_id = %message.id,
            order_id = event.order_id(),
            event = event.kind(),
            redelivery = message.is_redelivery(),
            "order event accepted"
        );
        ProcessingOutcome::Success
    }
}

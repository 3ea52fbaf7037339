mod common;

use std::sync::Arc;

use common::{DEAD_LETTER_QUEUE, MemoryTransport, SOURCE_QUEUE, ScriptedProcessor, message};
use rs_sqs_consumer::errors::AckError;
use rs_sqs_consumer::message::{AckDecision, OutgoingMessage, ProcessingOutcome};
use rs_sqs_consumer::receiver::{AckAction, MessageHandler};

fn handler(transport: &Arc<MemoryTransport>, dead_letter: bool) -> MessageHandler<MemoryTransport> {
    MessageHandler::new(
        Arc::clone(transport),
        SOURCE_QUEUE,
        dead_letter.then(|| DEAD_LETTER_QUEUE.to_string()),
    )
}

#[tokio::test]
async fn mixed_batch_gets_independent_ack_decisions() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, true);

    let report = handler
        .process_batch(
            vec![message("1", "ok"), message("2", "retry"), message("3", "fatal")],
            &ScriptedProcessor::default(),
        )
        .await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.get("1").unwrap().decision, AckDecision::Delete);
    assert_eq!(report.get("1").unwrap().ack.as_ref().unwrap(), &AckAction::Deleted);
    assert_eq!(report.get("2").unwrap().decision, AckDecision::LeaveForRedelivery);
    assert_eq!(
        report.get("2").unwrap().ack.as_ref().unwrap(),
        &AckAction::LeftForRedelivery
    );
    assert_eq!(report.get("3").unwrap().decision, AckDecision::RouteToDeadLetter);
    assert!(matches!(
        report.get("3").unwrap().ack,
        Ok(AckAction::DeadLettered { .. })
    ));

    assert_eq!(transport.deleted(), vec!["rh-1".to_string(), "rh-3".to_string()]);
    assert_eq!(
        transport.sent(),
        vec![(DEAD_LETTER_QUEUE.to_string(), "fatal".to_string())]
    );
    assert_eq!(report.deleted(), 1);
    assert_eq!(report.dead_lettered(), 1);
    assert_eq!(report.left_for_redelivery(), 1);
    assert_eq!(report.ack_failures(), 0);
}

#[tokio::test]
async fn success_is_deleted_exactly_once() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, true);

    let report = handler
        .handle_message(message("1", "ok"), &ScriptedProcessor::default())
        .await;

    assert!(report.is_removed());
    assert_eq!(transport.delete_attempts(), vec!["rh-1".to_string()]);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn retryable_failure_never_touches_the_queue() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, true);

    let report = handler
        .handle_message(message("1", "retry"), &ScriptedProcessor::default())
        .await;

    assert_eq!(report.outcome, ProcessingOutcome::retryable("downstream unavailable"));
    assert!(!report.is_removed());
    assert!(transport.delete_attempts().is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn terminal_failure_is_kept_when_dead_letter_publish_fails() {
    let transport = Arc::new(MemoryTransport::new());
    transport.fail_sends();
    let handler = handler(&transport, true);

    let report = handler
        .handle_message(message("1", "fatal"), &ScriptedProcessor::default())
        .await;

    assert!(matches!(report.ack, Err(AckError::DeadLetterPublish(_))));
    assert!(transport.delete_attempts().is_empty());
}

#[tokio::test]
async fn terminal_failure_is_kept_without_dead_letter_queue() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, false);

    let report = handler
        .handle_message(message("1", "fatal"), &ScriptedProcessor::default())
        .await;

    assert!(matches!(report.ack, Err(AckError::NoDeadLetterQueue)));
    assert!(transport.delete_attempts().is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn failed_delete_after_dead_letter_is_reported() {
    let transport = Arc::new(MemoryTransport::new());
    transport.fail_delete("rh-1");
    let handler = handler(&transport, true);

    let report = handler
        .handle_message(message("1", "fatal"), &ScriptedProcessor::default())
        .await;

    match report.ack {
        Err(AckError::DeleteAfterDeadLetter { dead_letter_id, .. }) => assert_eq!(dead_letter_id, "dlq-1"),
        other => panic!("unexpected ack {other:?}"),
    }
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.delete_attempts(), vec!["rh-1".to_string()]);
}

#[tokio::test]
async fn processor_panic_is_isolated_to_its_message() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, true);

    let report = handler
        .process_batch(
            vec![
                message("1", "ok"),
                message("2", "panic"),
                message("3", "ok"),
                message("4", "retry"),
            ],
            &ScriptedProcessor::default(),
        )
        .await;

    let panicked = report.get("2").unwrap();
    assert!(matches!(
        &panicked.outcome,
        ProcessingOutcome::TerminalFailure(reason) if reason.contains("panicked")
    ));
    assert_eq!(panicked.decision, AckDecision::RouteToDeadLetter);
    assert!(panicked.is_removed());

    assert_eq!(
        transport.deleted(),
        vec!["rh-1".to_string(), "rh-2".to_string(), "rh-3".to_string()]
    );
    assert_eq!(
        transport.sent(),
        vec![(DEAD_LETTER_QUEUE.to_string(), "panic".to_string())]
    );
    assert_eq!(report.left_for_redelivery(), 1);
}

#[tokio::test]
async fn delete_failure_does_not_affect_other_messages() {
    let transport = Arc::new(MemoryTransport::new());
    transport.fail_delete("rh-2");
    let handler = handler(&transport, true);

    let report = handler
        .process_batch(
            vec![message("1", "ok"), message("2", "ok"), message("3", "ok")],
            &ScriptedProcessor::default(),
        )
        .await;

    assert!(matches!(report.get("2").unwrap().ack, Err(AckError::Delete(_))));
    assert_eq!(report.deleted(), 2);
    assert_eq!(report.ack_failures(), 1);
    assert_eq!(transport.delete_attempts().len(), 3);
}

#[tokio::test]
async fn fifo_dead_letter_carries_group_and_deduplication_ids() {
    let transport = Arc::new(MemoryTransport::new());
    let dead_letter_fifo = "https://sqs.test.local/000000000000/orders-dlq.fifo";
    let handler = MessageHandler::new(
        Arc::clone(&transport),
        "https://sqs.test.local/000000000000/orders.fifo",
        Some(dead_letter_fifo.to_string()),
    );

    let grouped = message("1", "fatal").with_message_group_id("customer-42");
    let report = handler
        .process_batch(vec![grouped, message("2", "fatal")], &ScriptedProcessor::default())
        .await;

    assert_eq!(report.dead_lettered(), 2);
    let mut sent = transport.sent_messages();
    sent.sort_by(|a, b| a.1.deduplication_id.cmp(&b.1.deduplication_id));
    assert_eq!(
        sent,
        vec![
            (
                dead_letter_fifo.to_string(),
                OutgoingMessage::new("fatal").with_fifo("customer-42", "1"),
            ),
            (
                dead_letter_fifo.to_string(),
                OutgoingMessage::new("fatal").with_fifo("2", "2"),
            ),
        ]
    );
}

#[tokio::test]
async fn standard_dead_letter_has_no_fifo_ids() {
    let transport = Arc::new(MemoryTransport::new());
    let handler = handler(&transport, true);

    handler
        .handle_message(
            message("1", "fatal").with_message_group_id("customer-42"),
            &ScriptedProcessor::default(),
        )
        .await;

    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, OutgoingMessage::new("fatal"));
}

//! Worker entry point: polls the configured queue until a termination signal
//! arrives, then drains in-flight messages within the grace period.
//!
//! Exit status: 0 after a clean drain, 1 when messages were abandoned or
//! polling gave up, 2 when startup failed.

mod orders;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use rs_sqs_consumer::client;
use rs_sqs_consumer::errors::ConsumerError;
use rs_sqs_consumer::lifecycle::{self, Shutdown};
use rs_sqs_consumer::logging;
use rs_sqs_consumer::receiver::{DrainReport, QueueReceiver};
use rs_sqs_consumer::settings::Settings;
use rs_sqs_consumer::transport::SqsTransport;
use tracing::{error, info};

use crate::orders::OrderEventProcessor;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match Settings::load().and_then(|settings| settings.validate().map(|()| settings)) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("sqs-consumer-worker: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    if let Err(err) = logging::init(&settings.log.level, settings.log.json) {
        eprintln!("sqs-consumer-worker: failed to initialize logging: {err}");
        return ExitCode::from(2);
    }

    match run(settings).await {
        Ok(report) => {
            info!(processed = report.processed, "worker exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = format!("{err:#}"), "worker failed");
            let code = err.downcast_ref::<ConsumerError>().map_or(2, ConsumerError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<DrainReport> {
    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(shutdown.clone()).context("installing signal handlers")?;

    let region = settings.queue.region.as_deref();
    let endpoint_url = settings.queue.endpoint_url.as_deref();
    let sqs_client = match (settings.static_credentials(), region) {
        (Some((access_key_id, secret_access_key)), Some(region)) => {
            info!(region, "using static credentials from settings");
            client::create_sqs_client_with_credentials(access_key_id, secret_access_key, region, endpoint_url)
        }
        _ => client::create_sqs_client(region, endpoint_url).await,
    };
    client::probe_queue(&sqs_client, &settings.queue.url).await?;
    if let Some(dead_letter_url) = settings.queue.dead_letter_url.as_deref() {
        client::probe_queue(&sqs_client, dead_letter_url).await?;
    }

    let receiver = QueueReceiver::new(
        Arc::new(SqsTransport::new(sqs_client)),
        Arc::new(OrderEventProcessor),
        settings.receiver_config(),
        shutdown,
    );
    Ok(receiver.run().await?)
}

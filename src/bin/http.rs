//! HTTP entry point: serves the health surface until a termination signal
//! arrives, then waits for in-flight requests within the grace period.
//!
//! Exit status: 0 after a clean stop, 1 when requests were cut off at the end
//! of the grace period, 2 when startup failed.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use rs_sqs_consumer::errors::ConsumerError;
use rs_sqs_consumer::lifecycle::{self, Shutdown};
use rs_sqs_consumer::settings::Settings;
use rs_sqs_consumer::{http, logging};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match Settings::load().and_then(|settings| settings.validate_http().map(|()| settings)) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("sqs-consumer-http: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    if let Err(err) = logging::init(&settings.log.level, settings.log.json) {
        eprintln!("sqs-consumer-http: failed to initialize logging: {err}");
        return ExitCode::from(2);
    }

    match run(settings).await {
        Ok(()) => {
            info!("http server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = format!("{err:#}"), "http server failed");
            let code = err.downcast_ref::<ConsumerError>().map_or(2, ConsumerError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(shutdown.clone()).context("installing signal handlers")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| ConsumerError::Server(format!("failed to bind {addr}: {err}")))?;

    let router = http::app(http::health_routes(shutdown.clone()), settings.request_timeout());
    http::serve(listener, router, shutdown, settings.grace_period()).await?;
    Ok(())
}

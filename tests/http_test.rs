use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use rs_sqs_consumer::errors::{ConsumerError, ShutdownError};
use rs_sqs_consumer::http;
use rs_sqs_consumer::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

async fn status(router: Router, path: &str) -> StatusCode {
    router
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn readiness_flips_when_draining() {
    let shutdown = Shutdown::new();
    let routes = http::app(http::health_routes(shutdown.clone()), Duration::from_secs(1));

    assert_eq!(status(routes.clone(), "/healthz").await, StatusCode::OK);
    assert_eq!(status(routes.clone(), "/readyz").await, StatusCode::OK);

    shutdown.trigger();

    assert_eq!(status(routes.clone(), "/healthz").await, StatusCode::OK);
    assert_eq!(status(routes, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn idle_server_stops_promptly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(http::serve(
        listener,
        http::health_routes(shutdown.clone()),
        shutdown.clone(),
        Duration::from_secs(5),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    shutdown.trigger();

    server.await.unwrap().expect("clean stop");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn in_flight_request_completes_within_grace() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let router = Router::new().route(
        "/work",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "done"
        }),
    );
    let server = tokio::spawn(http::serve(listener, router, shutdown.clone(), Duration::from_secs(2)));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /work HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("done"), "{response}");

    server.await.unwrap().expect("request finished within grace");
}

#[tokio::test]
async fn request_outliving_grace_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let router = Router::new().route(
        "/stuck",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        }),
    );
    let server = tokio::spawn(http::serve(listener, router, shutdown.clone(), Duration::from_millis(200)));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /stuck HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    shutdown.trigger();

    let result = server.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        result,
        Err(ConsumerError::Shutdown(ShutdownError::Timeout { .. }))
    ));
}

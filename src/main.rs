//! Enclave Relay Server
//!
//! Runs on the parent instance and gives the enclave HTTP access to SQS, S3,
//! SNS and DynamoDB.
//!
//! # Modes
//!
//! - **vsock** (production): `USE_VSOCK=1` - HTTP over vsock, reachable from the enclave
//! - **TCP** (development): Default - HTTP on `PORT` for curl testing

use anyhow::Result;
use bytes::Bytes;
use enclave_relay::aws::AwsClients;
use enclave_relay::config::RelayConfig;
use enclave_relay::queue::consumer::QueueConsumer;
use enclave_relay::relay::RelayHandler;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

struct AppState {
    relay: RelayHandler,
}

async fn handle_http_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    Ok(state.relay.handle(req).await)
}

async fn run_http_server(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening");

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_http_request(Arc::clone(&state), req));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(remote_addr = %remote_addr, error = %e, "Connection error");
            }
        });
    }
}

#[cfg(target_os = "linux")]
async fn run_vsock_server(state: Arc<AppState>, port: u32) -> Result<()> {
    use tokio_vsock::{VsockAddr, VsockListener};

    let addr = VsockAddr::new(nix::libc::VMADDR_CID_ANY, port);
    let mut listener = VsockListener::bind(addr)?;
    info!(cid = "ANY", port = port, "vsock server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_http_request(Arc::clone(&state), req));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(addr = ?addr, error = %e, "Connection error");
            }
        });
    }
}

#[cfg(not(target_os = "linux"))]
async fn run_vsock_server(_state: Arc<AppState>, _port: u32) -> Result<()> {
    anyhow::bail!("vsock is only supported on Linux")
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Enclave Relay...");

    // A queue that cannot be resolved aborts startup here
    let aws_clients = Arc::new(AwsClients::new(&config).await?);

    let consumer = Arc::new(QueueConsumer::new(
        Arc::new(aws_clients.queue.clone()),
        config.queue.ack_mode,
    ));
    info!(
        queue_url = %aws_clients.queue.queue_url(),
        ack_mode = %config.queue.ack_mode,
        response_shape = ?config.queue.response_shape,
        "Queue consumer ready"
    );

    let relay = RelayHandler::with_aws(
        consumer,
        config.queue.response_shape,
        config.queue.default_max_messages,
        aws_clients,
    );
    let state = Arc::new(AppState { relay });

    if config.server.use_vsock {
        info!("Running vsock server on port {}", config.server.vsock_port);
        run_vsock_server(state, config.server.vsock_port).await
    } else {
        run_http_server(state, config.server.http_port).await
    }
}

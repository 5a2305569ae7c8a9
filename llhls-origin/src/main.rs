mod byte_source;
mod cli;
mod demux;
mod error;
mod framer;
mod pipeline;
mod routes;
mod state;
mod writer;

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use byte_source::ByteSource;
use cli::{Args, OutputFormat};
use pipeline::Pipeline;
use state::{AppState, new_store};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "llhls_origin=info,hls=info,ts=info";

fn init_logging(directive: Option<&str>) {
    let filter = directive
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let is_fmp4 = args.format == OutputFormat::Fmp4;
    let content_type = if is_fmp4 { "video/mp4" } else { "video/mp2t" };

    let source = match &args.input {
        Some(path) => match ByteSource::open_file(path).await {
            Ok(source) => source,
            Err(err) => {
                tracing::error!(error = %err, path = %path.display(), "failed to open input");
                return std::process::ExitCode::FAILURE;
            }
        },
        None => ByteSource::stdin(),
    };

    let store = new_store(args.window_size, args.target_duration, args.part_duration, is_fmp4);
    let mut pipeline =
        Pipeline::new(source, args.sid, args.target_duration, args.part_duration, is_fmp4, store);
    let handle = pipeline.handle(content_type);
    let app_state = AppState::new(handle, args.target_duration, args.part_duration);

    let router = routes::router(app_state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind HTTP listener");
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "llhls-origin listening");

    let shutdown = CancellationToken::new();
    let pipeline_shutdown = shutdown.clone();
    let pipeline_task = tokio::spawn(async move { pipeline.run(pipeline_shutdown).await });

    let server_shutdown = shutdown.clone();
    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                }
                _ = wait_for_sigterm() => {
                    tracing::info!("received SIGTERM, shutting down");
                }
                _ = server_shutdown.cancelled() => {
                    tracing::info!("pipeline reached EOF, shutting down");
                }
            }
            shutdown.cancel();
        })
        .await;

    pipeline_task.abort();
    let pipeline_result = pipeline_task.await;

    if let Err(err) = serve_result {
        tracing::error!(error = %err, "HTTP server error");
        return std::process::ExitCode::FAILURE;
    }
    match pipeline_result {
        Ok(Ok(())) => std::process::ExitCode::SUCCESS,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "pipeline read failed");
            std::process::ExitCode::FAILURE
        }
        Err(_) => std::process::ExitCode::SUCCESS,
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

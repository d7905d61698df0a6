//! Entrypoint. Mirrors `dog4ik-media-server/src/main.rs`'s startup sequence:
//! parse CLI, load layered config, init tracing, build the router, bind the
//! listener, serve with graceful shutdown, then tear down anything still
//! live.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use rtsp_hls_gateway::config::{self, Args, Config};
use rtsp_hls_gateway::gateway::{self, AppState};
use rtsp_hls_gateway::logging;
use rtsp_hls_gateway::stream::registry::StreamsRegistry;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Must run before Config::load: it reads override values straight out of
    // std::env::var, so a .env file arrives too late to affect it otherwise.
    let dotenv_result = dotenvy::dotenv();

    let config = Config::load(args).await;
    config::init(config);
    let config = config::get();

    logging::init_tracer(config.debug_logging);

    match dotenv_result {
        Ok(path) => tracing::info!("loaded environment overrides from {}", path.display()),
        Err(dotenvy::Error::Io(_)) => {}
        Err(err) => tracing::warn!("failed to load .env: {err}"),
    }

    if let Err(err) = tokio::fs::create_dir_all(&config.transcode_dir).await {
        tracing::error!("failed to create transcode directory: {err}");
        return;
    }

    let registry = StreamsRegistry::new(config.max_concurrent_streams);
    let state = AppState { config, registry: registry.clone() };
    let app = gateway::router(state);

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), config.server_port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind port {}: {err}", config.server_port);
            return;
        }
    };
    tracing::info!(port = config.server_port, "listening");

    let cancellation_token = CancellationToken::new();
    {
        let cancellation_token = cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(cancellation_token.cancelled_owned())
                .await
            {
                tracing::error!("server error: {err}");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation_token.cancel();
        }
        _ = cancellation_token.cancelled() => {}
    }

    tracing::info!("shutting down, tearing down live streams");
    for stream in registry.all() {
        stream.kill(true, &config.transcode_dir).await;
    }
    tracing::info!("shut down cleanly");
}

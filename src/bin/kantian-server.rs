//! kantian-server: the REST surface over an in-memory ontology.
//!
//! Build and run: `cargo run --features http --bin kantian-server -- --config kantian.toml`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kantian_graph::{MemoryBackend, Ontology, ServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "kantian-server", version, about = "Kantian knowledge graph REST server")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen address, overriding `http.bind`.
    #[arg(long, short)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> kantian_graph::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.http.bind = bind;
    }
    let addr = config.http.bind.clone();

    let db = Arc::new(Ontology::open(MemoryBackend::new(), config).await?);
    let app = kantian_graph::http::router(Arc::clone(&db));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("kantian-server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.shutdown().await?;
    tracing::info!("kantian-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

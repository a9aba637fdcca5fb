use anyhow::{Context, Result, bail};
use axum::Router;
use chunkstream::{
    client::{FileDescriptor, HttpTransport, RetryPolicy, UploadScheduler},
    config::{AppConfig, ClientConfig, Mode},
    models::upload::ChunkEncoding,
    routes,
    services::janitor::spawn_janitor,
    state::AppState,
};
use std::{io::ErrorKind, net::SocketAddr};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    match Mode::from_env_and_args()? {
        Mode::Serve(cfg) => serve(cfg).await,
        Mode::Upload(cfg) => upload(cfg).await,
    }
}

async fn serve(cfg: AppConfig) -> Result<()> {
    tracing::info!("Starting chunkstream with config: {:?}", cfg);

    // --- Ensure storage directories exist ---
    let state = AppState::from_config(&cfg);
    state.prepare().await.with_context(|| {
        format!(
            "creating storage directories under {}",
            cfg.storage_dir.display()
        )
    })?;

    // --- Background cleanup of abandoned uploads ---
    let _janitor = spawn_janitor(cfg.staging_dir(), cfg.staging_ttl(), cfg.sweep_interval());

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn upload(cfg: ClientConfig) -> Result<()> {
    if cfg.files.is_empty() {
        bail!("no files to upload");
    }

    let mut files = Vec::with_capacity(cfg.files.len());
    for path in &cfg.files {
        let file = FileDescriptor::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(file);
    }

    let encoding = if cfg.base64 {
        ChunkEncoding::Base64
    } else {
        ChunkEncoding::Raw
    };
    let transport =
        HttpTransport::new(reqwest::Client::new(), &cfg.server_url).with_encoding(encoding);

    let mut scheduler = UploadScheduler::new(transport, cfg.chunk_size)
        .with_retry_policy(RetryPolicy::with_retries(cfg.retries));
    scheduler.enqueue(files);
    scheduler.run().await?;

    for entry in scheduler.entries() {
        if let Some(final_filename) = &entry.final_filename {
            println!("{} -> {}", entry.file.name, final_filename);
        }
    }

    Ok(())
}

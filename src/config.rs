use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use crate::client::DEFAULT_CHUNK_SIZE;

/// Server configuration. Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub max_chunk_bytes: usize,
    pub staging_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Upload client configuration for the `upload` subcommand.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub chunk_size: u64,
    pub retries: u32,
    pub base64: bool,
    pub files: Vec<PathBuf>,
}

/// What the process was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(AppConfig),
    Upload(ClientConfig),
}

/// Command-line + environment configuration.
///
/// Server flags are global, so they may appear before or after `serve`.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload server with range-request playback")]
pub struct Args {
    /// Host to bind to (overrides CHUNKSTREAM_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNKSTREAM_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Root directory for staging and finalized files (overrides CHUNKSTREAM_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Largest accepted chunk body in bytes (overrides CHUNKSTREAM_MAX_CHUNK_BYTES)
    #[arg(long, global = true)]
    pub max_chunk_bytes: Option<usize>,

    /// Age after which orphaned staging files are deleted, 0 disables (overrides CHUNKSTREAM_STAGING_TTL_SECS)
    #[arg(long, global = true)]
    pub staging_ttl_secs: Option<u64>,

    /// Seconds between staging sweeps (overrides CHUNKSTREAM_SWEEP_INTERVAL_SECS)
    #[arg(long, global = true)]
    pub sweep_interval_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the upload/streaming server (default)
    Serve,
    /// Upload files to a running server, one chunk at a time
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Server base URL (overrides CHUNKSTREAM_SERVER_URL)
    #[arg(long)]
    pub server: Option<String>,

    /// Chunk size in bytes (overrides CHUNKSTREAM_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Retries per chunk after the first attempt (overrides CHUNKSTREAM_RETRIES)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Send chunks as base64 text instead of raw octets
    #[arg(long)]
    pub base64: bool,

    /// Files to upload, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl Mode {
    /// Parse CLI args and merge them over environment variables.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    /// Merge already-parsed args over values from `lookup`, then defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        match args.command {
            Some(Command::Upload(upload)) => {
                let chunk_size = match upload.chunk_size {
                    Some(size) => size,
                    None => env_or(&lookup, "CHUNKSTREAM_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
                };
                if chunk_size == 0 {
                    bail!("chunk size must be greater than zero");
                }

                let retries = match upload.retries {
                    Some(retries) => retries,
                    None => env_or(&lookup, "CHUNKSTREAM_RETRIES", 4)?,
                };
                let server_url = match upload.server {
                    Some(url) => url,
                    None => env_or(
                        &lookup,
                        "CHUNKSTREAM_SERVER_URL",
                        "http://127.0.0.1:4001".to_string(),
                    )?,
                };

                Ok(Mode::Upload(ClientConfig {
                    server_url,
                    chunk_size,
                    retries,
                    base64: upload.base64,
                    files: upload.files,
                }))
            }
            Some(Command::Serve) | None => {
                // --- Environment fallback ---
                let env_host = env_or(&lookup, "CHUNKSTREAM_HOST", "0.0.0.0".to_string())?;
                let env_port = env_or(&lookup, "CHUNKSTREAM_PORT", 4001u16)?;
                let env_storage =
                    env_or(&lookup, "CHUNKSTREAM_STORAGE_DIR", PathBuf::from("./data"))?;
                let env_max_chunk =
                    env_or(&lookup, "CHUNKSTREAM_MAX_CHUNK_BYTES", 10 * 1024 * 1024usize)?;
                let env_ttl = env_or(&lookup, "CHUNKSTREAM_STAGING_TTL_SECS", 24 * 60 * 60u64)?;
                let env_sweep = env_or(&lookup, "CHUNKSTREAM_SWEEP_INTERVAL_SECS", 10 * 60u64)?;

                // --- Merge ---
                Ok(Mode::Serve(AppConfig {
                    host: args.host.unwrap_or(env_host),
                    port: args.port.unwrap_or(env_port),
                    storage_dir: args.storage_dir.unwrap_or(env_storage),
                    max_chunk_bytes: args.max_chunk_bytes.unwrap_or(env_max_chunk),
                    staging_ttl_secs: args.staging_ttl_secs.unwrap_or(env_ttl),
                    sweep_interval_secs: args.sweep_interval_secs.unwrap_or(env_sweep),
                }))
            }
        }
    }
}

impl AppConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// In-progress uploads. Never served.
    pub fn staging_dir(&self) -> PathBuf {
        self.storage_dir.join("staging")
    }

    /// Finalized resources, served under `/uploads`.
    pub fn public_dir(&self) -> PathBuf {
        self.storage_dir.join("uploads")
    }

    pub fn staging_ttl(&self) -> Duration {
        Duration::from_secs(self.staging_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Read `key` through `lookup`, parse it, or fall back to `default` when unset.
fn env_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use ivcap_environment::{DEFAULT_MAX_ATTEMPTS, Environment, Options, PipeWriter, Readiness};

/// Example ivcap worker: publishes a message, a file or a fetched background
/// as an artifact, together with a metadata record describing it.
#[derive(Parser)]
#[command(name = "ivcap-worker")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Message to publish
  #[arg(long, default_value = "Hello World")]
  msg: String,

  /// Artifact URN to fetch as background
  #[arg(long)]
  img_art: Option<String>,

  /// External URL to fetch as background
  #[arg(long)]
  img_url: Option<String>,

  /// Publish the contents of this file instead
  #[arg(long)]
  file: Option<PathBuf>,

  /// Name of the published artifact
  #[arg(long, default_value = "out.txt")]
  name: String,

  /// Content type of the published artifact
  #[arg(long, default_value = "text/plain")]
  content_type: String,

  /// Run in local mode for testing
  #[arg(long)]
  local: bool,

  /// Do not use the cache endpoint even if one is configured
  #[arg(long)]
  no_caching: bool,

  /// Skip checking for a sidecar
  #[arg(long)]
  skip_sidecar_check: bool,

  /// Readiness probes before giving up
  #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
  max_attempts: u32,

  /// Log at debug level
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Debug, Serialize)]
struct Meta {
  #[serde(rename = "message", skip_serializing_if = "String::is_empty")]
  message: String,
  #[serde(rename = "background-url", skip_serializing_if = "String::is_empty")]
  background_url: String,
  #[serde(rename = "background-artifact", skip_serializing_if = "String::is_empty")]
  background_artifact: String,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(cli).await })
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .init();
}

async fn run(cli: Cli) -> Result<()> {
  tracing::info!(version = env!("CARGO_PKG_VERSION"), "ivcap example worker");

  let env = Environment::new(Options {
    local_mode: cli.local,
    no_caching: cli.no_caching,
    logger: None,
  })
  .context("failed to set up environment")?;

  tracing::info!(
    msg = %cli.msg,
    img_art = cli.img_art.as_deref().unwrap_or(""),
    img_url = cli.img_url.as_deref().unwrap_or(""),
    "parameters"
  );

  if !cli.skip_sidecar_check {
    match env
      .wait_until_ready(cli.max_attempts)
      .await
      .context("storage sidecar is not ready")?
    {
      Readiness::Skipped => tracing::debug!("local mode, readiness skipped"),
      Readiness::Ready { attempts } => tracing::debug!(attempts, "storage sidecar ready"),
    }
  }

  let background = match cli.img_art.as_deref().or(cli.img_url.as_deref()) {
    Some(reference) => Some(
      fetch_background(&env, reference)
        .await
        .with_context(|| format!("failed to fetch background '{}'", reference))?,
    ),
    None => None,
  };

  let body = match (&cli.file, background) {
    (Some(path), _) => Body::File(path.clone()),
    (None, Some(bytes)) => Body::Bytes(bytes),
    (None, None) => Body::Bytes(format!("{}\nOrder: {}\n", cli.msg, env.order_id()).into_bytes()),
  };

  let meta = Meta {
    message: cli.msg,
    background_url: cli.img_url.unwrap_or_default(),
    background_artifact: cli.img_art.unwrap_or_default(),
  };

  let outcome = env
    .publish_async(cli.name, cli.content_type, Some(meta), move |writer| {
      body.write_to(writer)
    })
    .wait()
    .await;

  if let Some(e) = outcome.metadata_failure() {
    tracing::error!(error = %e, "metadata was not registered");
  }
  let name = outcome.name.clone();
  let publication = outcome
    .into_result()
    .with_context(|| format!("failed to publish '{}'", name))?;

  match publication.artifact_id() {
    Some(id) => tracing::info!(artifact = %id, "published '{}'", name),
    None => tracing::info!("wrote '{}' locally", name),
  }
  tracing::info!("DONE");
  Ok(())
}

async fn fetch_background(env: &Environment, reference: &str) -> Result<Vec<u8>> {
  let bytes = env
    .fetch(reference, |mut body| async move {
      let mut buf = Vec::new();
      body.read_to_end(&mut buf).await?;
      Ok::<_, std::io::Error>(buf)
    })
    .await?;

  if bytes.is_empty() {
    bail!("background '{}' is empty", reference);
  }
  tracing::debug!(size = bytes.len(), "fetched background");
  Ok(bytes)
}

/// What the worker writes into the artifact.
enum Body {
  File(PathBuf),
  Bytes(Vec<u8>),
}

impl Body {
  async fn write_to(self, mut writer: PipeWriter) -> std::io::Result<()> {
    match self {
      Body::File(path) => {
        let mut file = tokio::fs::File::open(&path).await?;
        tokio::io::copy(&mut file, &mut writer).await?;
      }
      Body::Bytes(bytes) => writer.write_all(&bytes).await?,
    }
    writer.shutdown().await
  }
}

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use satchel::cache::SqliteStore;
use satchel::config::Config;
use satchel::http::OriginClient;
use satchel::notify::LogSink;
use satchel::sync::SqliteQueue;
use satchel::Agent;

#[derive(Parser, Debug)]
#[command(name = "satchel")]
#[command(about = "Offline cache and deferred sync agent for storefront clients")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/satchel/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin base URL, overriding the config file
  #[arg(long)]
  origin: Option<String>,

  /// Directory for the cache database, overriding the config file
  #[arg(long)]
  data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("satchel=info")),
    )
    .init();

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(origin) = args.origin {
    config.origin.url = origin;
  }
  if let Some(data_dir) = args.data_dir {
    config.cache.data_dir = Some(data_dir);
  }

  // Tier store and mutation queue share one database file
  let db_path = match &config.cache.data_dir {
    Some(dir) => dir.join("cache.db"),
    None => SqliteStore::default_path()?,
  };
  let store = Arc::new(SqliteStore::open_at(&db_path)?);
  let queue = Arc::new(SqliteQueue::open_at(&db_path)?);
  let origin = OriginClient::new(&config.origin.url)?;

  // Run the agent
  let mut agent = Agent::new(config, store, queue, origin, LogSink)?;
  agent.run().await
}

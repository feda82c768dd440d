mod agent;
mod cache;
mod config;
mod event;
mod net;
mod runtime;

use clap::Parser;
use color_eyre::Result;
use futures::future::join_all;
use reqwest::header::{HeaderValue, ACCEPT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::agent::CacheAgent;
use crate::cache::{CacheStorage, RequestKey, SqliteStorage};
use crate::config::{AgentConfig, Config};
use crate::net::{HttpClient, Request};
use crate::runtime::HostRuntime;

#[derive(Parser, Debug)]
#[command(name = "cache-agent")]
#[command(about = "Cache-first offline agent for a web application")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cache-agent/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Registration scope, overrides the config file
  #[arg(short, long)]
  scope: Option<Url>,

  /// Send requests as navigations (Accept: text/html)
  #[arg(long)]
  html: bool,

  /// Simulate an older agent still controlling open pages
  #[arg(long)]
  predecessor: bool,

  /// Keep the cache in memory instead of on disk
  #[arg(long)]
  ephemeral: bool,

  /// URLs to request through the agent once it is active
  urls: Vec<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;

  // Override scope if specified on command line
  let config = if let Some(scope) = args.scope {
    Config { scope, ..config }
  } else {
    config
  };

  let _guard = init_tracing(config.log_file.as_deref())?;

  let storage = match &config.storage_path {
    _ if args.ephemeral => SqliteStorage::in_memory()?,
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open_default()?,
  };
  let client = HttpClient::new()?;
  let agent = CacheAgent::new(
    AgentConfig::for_scope(&config.scope)?,
    storage,
    client.clone(),
  );

  let runtime = HostRuntime::new(Arc::new(agent.clone()), Arc::new(client))
    .with_predecessor(args.predecessor);
  let state = runtime.register().await;
  println!(
    "agent {:?}, clients claimed: {}, generations: {:?}",
    state,
    runtime.signals().clients_claimed(),
    agent.storage().keys()?
  );

  let requests = args.urls.into_iter().map(|url| {
    let request = Request::get(url);
    if args.html {
      request.with_header(ACCEPT, HeaderValue::from_static("text/html"))
    } else {
      request
    }
  });
  let results = join_all(requests.map(|request| {
    let runtime = &runtime;
    async move {
      let result = runtime.fetch(&request).await;
      (request.url, result)
    }
  }))
  .await;

  for (url, result) in &results {
    match result {
      Ok(response) => println!(
        "{} {} {} ({} bytes, {})",
        response.status,
        response.status_text,
        url,
        response.body.len(),
        response.header("content-type").unwrap_or("no content-type")
      ),
      Err(err) => println!("ERR {} {}", url, err),
    }
  }

  agent.settle().await;

  let cache_name = &agent.config().cache_name;
  for (url, _) in &results {
    let stored = agent.storage().match_in(cache_name, &RequestKey::get(url))?;
    println!(
      "{} {}",
      if stored.is_some() { "cached" } else { "not cached" },
      url
    );
  }
  let cached = agent.storage().requests(cache_name)?;
  println!("{} cached in {}", cached.len(), cache_name);

  Ok(())
}

/// Log to stderr, or to `log_file` when set. Keep the guard alive until exit.
fn init_tracing(log_file: Option<&Path>) -> Result<WorkerGuard> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cache_agent=info"));

  let (writer, guard) = match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid log file path: {}", path.display()))?;
      tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
    }
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(log_file.is_none())
    .init();

  Ok(guard)
}

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use restbind::cache::{default_key, CachedClient, PersistentCachedClient, SqliteStore};
use restbind::model::{Record, RecordOptions, RecordSet};
use restbind::resource::{Id, Item, ResourceClient, RestClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{CacheMode, Config};

#[derive(Parser, Debug)]
#[command(name = "restbind")]
#[command(about = "Work with a REST collection through a write-through cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/restbind/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Collection URL, overrides the config file
  #[arg(short, long)]
  url: Option<String>,

  /// Cache mode, overrides the config file
  #[arg(long, value_enum)]
  cache: Option<CacheMode>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the whole collection
  List,
  /// Print one item
  Get { id: String },
  /// Create an item from a JSON object
  Create { json: String },
  /// Replace an item with a JSON object that carries its id
  Update { json: String },
  /// Delete an item
  Delete { id: String },
  /// Drop the persisted snapshot
  Evict,
}

/// Numeric ids are sent as numbers, anything else as a string.
fn parse_id(raw: &str) -> Id {
  raw.parse::<i64>().map(Id::Num).unwrap_or_else(|_| Id::from(raw))
}

fn parse_item(raw: &str) -> Result<Item> {
  match serde_json::from_str(raw)? {
    serde_json::Value::Object(item) => Ok(item),
    other => Err(eyre!("Expected a JSON object, got {}", other)),
  }
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
  let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
  let filter = EnvFilter::try_from_env("RESTBIND_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .init();

  guard
}

fn open_store(config: &Config) -> Result<SqliteStore> {
  let store = match &config.cache.path {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  };
  Ok(store)
}

fn store_key(config: &Config) -> String {
  config
    .cache
    .key
    .clone()
    .unwrap_or_else(|| default_key(&config.endpoint.url))
}

/// Build the client chain described by the configuration.
fn build_client(config: &Config) -> Result<Arc<dyn ResourceClient>> {
  let id_field = config.endpoint.id_field.as_str();
  let rest = RestClient::new(&config.endpoint.url)?.with_id_field(id_field);

  let client: Arc<dyn ResourceClient> = match config.cache.mode {
    CacheMode::None => Arc::new(rest),
    CacheMode::Memory => {
      Arc::new(CachedClient::new(rest, config.cache.ttl()).with_id_field(id_field))
    }
    CacheMode::Persistent => Arc::new(
      PersistentCachedClient::new(rest, open_store(config)?, store_key(config), config.cache.ttl())
        .with_id_field(id_field),
    ),
  };

  info!(url = %config.endpoint.url, mode = ?config.cache.mode, "client ready");
  Ok(client)
}

fn print_item(item: &Item) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(item)?);
  Ok(())
}

async fn run(config: Config, command: Command) -> Result<()> {
  if let Command::Evict = command {
    if config.cache.mode == CacheMode::Persistent {
      let rest = RestClient::new(&config.endpoint.url)?;
      PersistentCachedClient::new(rest, open_store(&config)?, store_key(&config), config.cache.ttl())
        .evict()?;
    }
    return Ok(());
  }

  let client = build_client(&config)?;
  let options = Arc::new(RecordOptions::default().with_id(config.endpoint.id_field.clone()));

  match command {
    Command::List => {
      let set = RecordSet::new(Vec::new(), Arc::clone(&client), (*options).clone());
      set.fetch().await?;
      let items: Vec<Item> = set.records().iter().map(Record::data).collect();
      println!("{}", serde_json::to_string_pretty(&items)?);
    }
    Command::Get { id } => {
      let mut item = Item::new();
      item.insert(config.endpoint.id_field.clone(), parse_id(&id).to_value());
      let record = Record::new(item, Arc::clone(&client), options).fetch().await?;
      print_item(&record.data())?;
    }
    Command::Create { json } | Command::Update { json } => {
      let record = Record::new(parse_item(&json)?, Arc::clone(&client), options);
      record.mark_dirty();
      let saved = record.commit(false).await?;
      print_item(&saved.data())?;
    }
    Command::Delete { id } => {
      let set = RecordSet::new(Vec::new(), Arc::clone(&client), (*options).clone());
      set.fetch().await?;
      let removed = set.del(Some(&parse_id(&id))).await?;
      info!(remaining = set.len(), "deleted {}", id);
      print_item(&removed.data())?;
    }
    Command::Evict => {}
  }

  // Let deferred cache updates land before the process exits
  client.settle().await?;
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_tracing();

  let args = Args::parse();

  // Load configuration, falling back to the bare --url
  let config = match (Config::load(args.config.as_deref())?, args.url.as_deref()) {
    (Some(config), Some(url)) => Config {
      endpoint: config::EndpointConfig {
        url: url.to_string(),
        ..config.endpoint
      },
      ..config
    },
    (Some(config), None) => config,
    (None, Some(url)) => Config::for_url(url),
    (None, None) => {
      return Err(eyre!(
        "No endpoint configured. Pass --url or create ~/.config/restbind/config.yaml"
      ))
    }
  };

  // Override cache mode if specified on command line
  let config = if let Some(mode) = args.cache {
    Config {
      cache: config::CacheConfig {
        mode,
        ..config.cache
      },
      ..config
    }
  } else {
    config
  };

  run(config, args.command).await
}

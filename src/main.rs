use apistate::cache::{CacheLayer, NoopStorage, SnapshotStorage, SqliteStorage};
use apistate::config::Config;
use apistate::{logging, Denormalizer, InboundEvent, Snapshot, SyncDriver, SyncEngine};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "apistate")]
#[command(about = "Replay JSON:API lifecycle events into a normalized cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/apistate/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Source marker of events to handle
  #[arg(long, global = true)]
  source: Option<String>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Feed newline-delimited lifecycle events through the engine
  Replay {
    /// File with one JSON event per line
    events: PathBuf,

    /// Start from and save to the persisted snapshot
    #[arg(long)]
    persist: bool,

    #[command(flatten)]
    output: Output,
  },
  /// Print the persisted snapshot
  Show {
    #[command(flatten)]
    output: Output,
  },
}

#[derive(clap::Args, Debug)]
struct Output {
  /// Print one denormalized object, as schema:id
  #[arg(long, value_parser = parse_pair)]
  object: Option<(String, String)>,

  /// Print the denormalized objects of a collection, as schema:tag
  #[arg(long, value_parser = parse_pair, conflicts_with = "object")]
  collection: Option<(String, String)>,

  /// Relationship depth for denormalized output
  #[arg(long)]
  max_depth: Option<usize>,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
  match s.split_once(':') {
    Some((schema, rest)) if !schema.is_empty() && !rest.is_empty() => {
      Ok((schema.to_string(), rest.to_string()))
    }
    _ => Err(format!("expected schema:value, got '{s}'")),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;

  // Override source if specified on command line
  let config = if let Some(source) = args.source {
    Config { source, ..config }
  } else {
    config
  };

  let _guard = logging::init(&config.logging, args.verbose);

  match args.command {
    Command::Replay {
      events,
      persist,
      output,
    } => {
      let storage: Box<dyn SnapshotStorage> = if persist || config.storage.enabled {
        Box::new(open_storage(&config)?)
      } else {
        Box::new(NoopStorage)
      };
      let layer = match storage.load()? {
        Some(stored) => {
          info!(cached_at = %stored.cached_at, "restored persisted snapshot");
          CacheLayer::restore(stored.snapshot)
        }
        None => CacheLayer::new(),
      };

      let snapshot = replay(&events, SyncEngine::new(config.source.clone()), layer).await?;
      storage.save(&snapshot)?;
      print(&snapshot, &output, &config)
    }
    Command::Show { output } => {
      let stored = open_storage(&config)?
        .load()?
        .ok_or_else(|| eyre!("No persisted snapshot found"))?;
      print(&stored.snapshot, &output, &config)
    }
  }
}

fn open_storage(config: &Config) -> Result<SqliteStorage> {
  match &config.storage.path {
    Some(path) => SqliteStorage::open(path),
    None => SqliteStorage::open_default(),
  }
}

async fn replay(path: &Path, engine: SyncEngine, layer: CacheLayer) -> Result<Snapshot> {
  let contents = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| eyre!("Failed to read events file {}: {}", path.display(), e))?;

  let handle = SyncDriver::spawn(engine, layer);
  let mut count = 0usize;

  for (index, line) in contents.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let event: InboundEvent = serde_json::from_str(line)
      .map_err(|e| eyre!("Invalid event on line {}: {}", index + 1, e))?;
    handle
      .submit(event)
      .await
      .map_err(|e| eyre!("Rejected event on line {}: {}", index + 1, e))?;
    count += 1;
  }

  info!(events = count, "replay finished");
  Ok(handle.snapshot())
}

fn print(snapshot: &Snapshot, output: &Output, config: &Config) -> Result<()> {
  let denormalizer =
    Denormalizer::new(snapshot).with_max_depth(output.max_depth.unwrap_or(config.denormalize.max_depth));

  let value = if let Some((schema, id)) = &output.object {
    denormalizer
      .denormalize(schema, id)
      .ok_or_else(|| eyre!("Object {}:{} is not cached", schema, id))?
  } else if let Some((schema, tag)) = &output.collection {
    if snapshot.collection(schema, tag).is_none() {
      let known = snapshot
        .collections(schema)
        .map(|c| c.tags().collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
      return Err(eyre!(
        "Collection {}:{} is not cached (known tags: {})",
        schema,
        tag,
        if known.is_empty() { "none" } else { known.as_str() }
      ));
    }
    serde_json::Value::Array(denormalizer.denormalize_collection(schema, tag))
  } else {
    serde_json::to_value(snapshot)?
  };

  println!("{}", serde_json::to_string_pretty(&value)?);
  Ok(())
}

//! `shelf`: mirror a user's media collections into a local snapshot.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use exn::ResultExt;
use serde_json::{Map, Value, json};
use shelf_config::Config;
use shelf_images::{HttpImageSource, ImageCache, ImageSourceHandle};
use shelf_library::{Kind, MarkerClassifier, Reconciler, SnapshotStore};
use shelf_storage::BackendHandle;
use shelf_storage::backend::LocalBackend;
use shelf_upstream::{Category, HttpSource, SourceHandle, Status};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    /// Configuration file (.toml, .yaml, .yml or .json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild a user's snapshot from the upstream collections.
    Build { uid: String },
    /// Print a user's snapshot, building it first if there is none.
    Show {
        uid: String,
        /// Re-check every cached cover and repair broken ones.
        #[arg(long)]
        validate: bool,
        #[arg(long)]
        kind: Option<Kind>,
        #[arg(long, value_parser = parse_status)]
        status: Option<Status>,
    },
    /// Delete a user's snapshot and page archives.
    Remove { uid: String },
    /// List users with a snapshot.
    Users,
    /// Look up a single subject and cache its cover.
    Detail {
        #[arg(value_parser = parse_category)]
        category: Category,
        id: String,
    },
    /// Cache (or repair) one image and print its local reference.
    Image { reference: String },
    /// Inspect or clean the image cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    Stats,
    /// Every entry, newest first.
    List,
    Purge(PurgeArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PurgeArgs {
    /// Delete entries not modified within this many days.
    #[arg(long)]
    older_than_days: Option<u64>,
    /// Delete these cache keys.
    #[arg(long, num_args = 1..)]
    name: Vec<String>,
}

fn parse_status(value: &str) -> std::result::Result<Status, String> {
    value.parse().map_err(|e: shelf_upstream::error::Error| e.to_string())
}

fn parse_category(value: &str) -> std::result::Result<Category, String> {
    value.parse().map_err(|e: shelf_upstream::error::Error| e.to_string())
}

struct App {
    reconciler: Reconciler,
    images: Arc<ImageCache>,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let data: BackendHandle =
            Arc::new(LocalBackend::new("data", &config.data_dir).or_raise(|| ErrorKind::Setup("data store"))?);
        let cache: BackendHandle =
            Arc::new(LocalBackend::new("images", &config.cache_dir).or_raise(|| ErrorKind::Setup("image store"))?);
        let upstream: SourceHandle = Arc::new(
            HttpSource::new(config.upstream_options()).or_raise(|| ErrorKind::Setup("upstream client"))?,
        );
        let downloader: ImageSourceHandle = Arc::new(
            HttpImageSource::new(config.image_options()).or_raise(|| ErrorKind::Setup("image client"))?,
        );

        let images = Arc::new(ImageCache::new(cache, downloader).with_prefix(config.images.prefix.clone()));
        let reconciler = Reconciler::new(upstream, SnapshotStore::new(data), images.clone())
            .with_classifier(MarkerClassifier::new(config.classify.tv_markers.clone()))
            .with_page_size(config.upstream.page_size)
            .with_batch_options(config.batch_options());
        Ok(Self { reconciler, images })
    }

    async fn run(&self, command: Command) -> Result<Value> {
        let value = match command {
            Command::Build { uid } => {
                let snapshot = self.reconciler.build_full(&uid).await.or_raise(|| ErrorKind::Command)?;
                serde_json::to_value(snapshot).or_raise(|| ErrorKind::Output)?
            },
            Command::Show { uid, validate, kind, status } => {
                let snapshot = self.reconciler.load_or_build(&uid, validate).await.or_raise(|| ErrorKind::Command)?;
                if kind.is_none() && status.is_none() {
                    serde_json::to_value(snapshot).or_raise(|| ErrorKind::Output)?
                } else {
                    let mut buckets = Map::new();
                    for kind in Kind::ALL.into_iter().filter(|k| kind.is_none_or(|wanted| wanted == *k)) {
                        let items: Vec<_> = snapshot.items(kind, status).collect();
                        buckets.insert(kind.to_string(), serde_json::to_value(items).or_raise(|| ErrorKind::Output)?);
                    }
                    Value::Object(buckets)
                }
            },
            Command::Remove { uid } => {
                self.reconciler.remove(&uid).await.or_raise(|| ErrorKind::Command)?;
                json!({ "removed": uid })
            },
            Command::Users => json!(self.reconciler.users().await.or_raise(|| ErrorKind::Command)?),
            Command::Detail { category, id } => {
                let detail = self.reconciler.detail(category, &id).await.or_raise(|| ErrorKind::Command)?;
                serde_json::to_value(detail).or_raise(|| ErrorKind::Output)?
            },
            Command::Image { reference } => {
                let local = self.images.resolve(&reference).await.or_raise(|| ErrorKind::Command)?;
                json!({ "source": reference, "local": local.as_str() })
            },
            Command::Cache { command } => self.cache(command).await?,
        };
        Ok(value)
    }

    async fn cache(&self, command: CacheCommand) -> Result<Value> {
        let value = match command {
            CacheCommand::Stats => {
                let stats = self.images.stats().await.or_raise(|| ErrorKind::Command)?;
                serde_json::to_value(stats).or_raise(|| ErrorKind::Output)?
            },
            CacheCommand::List => {
                let entries = self.images.list_entries().await.or_raise(|| ErrorKind::Command)?;
                serde_json::to_value(entries).or_raise(|| ErrorKind::Output)?
            },
            CacheCommand::Purge(PurgeArgs { older_than_days: Some(days), .. }) => {
                let age = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
                json!({ "purged": self.images.purge_older_than(age).await.or_raise(|| ErrorKind::Command)? })
            },
            CacheCommand::Purge(PurgeArgs { name, .. }) => {
                json!({ "purged": self.images.purge_named(&name).await.or_raise(|| ErrorKind::Command)? })
            },
        };
        Ok(value)
    }
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(data_dir = %config.data_dir.display(), cache_dir = %config.cache_dir.display(), "Configuration loaded");
    let app = App::new(&config)?;
    let output = app.run(cli.command).await?;
    let rendered = serde_json::to_string_pretty(&output).or_raise(|| ErrorKind::Output)?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:?}");
            ExitCode::FAILURE
        },
    }
}

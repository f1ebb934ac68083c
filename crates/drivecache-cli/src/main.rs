//! drivecache - command-line front end for the artifact cache and Drive gateway.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use drivecache::{ArtifactCache, CacheConfig, DriveConfig, DriveGateway};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "drivecache")]
#[command(about = "Cache Drive artifacts locally and manage remote folders")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// OAuth client credentials file (falls back to GDRIVE_CREDENTIALS_PATH)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Cached access token file (falls back to GDRIVE_TOKEN_PATH)
    #[arg(long, global = true)]
    token: Option<PathBuf>,

    /// Default output folder id (falls back to OUTPUT_FOLDER_ID)
    #[arg(long, global = true)]
    folder: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure a remote file is cached locally and print its path
    Fetch {
        remote_id: String,
        path: PathBuf,
        /// Files smaller than this many bytes are treated as corrupt
        #[arg(long, default_value_t = CacheConfig::DEFAULT_MIN_VALID_SIZE)]
        min_size: u64,
        /// Download even if a valid local copy exists
        #[arg(short, long)]
        force: bool,
    },
    /// Upload a file, replacing any same-named file in the folder
    Upload {
        path: PathBuf,
        /// Create a new file even if one with the same name exists
        #[arg(long)]
        always_create: bool,
    },
    /// List files in the folder
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Delete every file whose name starts with PREFIX
    DeletePrefix { prefix: String },
    /// Delete everything in the folder
    Clear,
    /// Check that the Drive API is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = DriveConfig::resolve(args.credentials, args.token, args.folder)?;
    info!("Using credentials at {}", config.credentials_path.display());

    let gateway = Arc::new(
        DriveGateway::from_config(&config)?.with_span(info_span!("gateway")),
    );

    match args.command {
        Command::Fetch {
            remote_id,
            path,
            min_size,
            force,
        } => {
            let cache = ArtifactCache::new(gateway.clone()).with_span(info_span!("cache"));
            let resolved = commands::fetch(&cache, &remote_id, &path, min_size, force).await?;
            println!("{}", resolved.display());
        }
        Command::Upload {
            path,
            always_create,
        } => {
            let folder = commands::resolve_folder(None, &gateway)?;
            let id = commands::upload(&gateway, &path, &folder, always_create).await?;
            println!("{}", id);
        }
        Command::List { limit } => {
            for file in commands::list(&gateway, None, limit).await? {
                println!("{}\t{}\t{}", file.id, file.mime_type, file.name);
            }
        }
        Command::DeletePrefix { prefix } => {
            let folder = commands::resolve_folder(None, &gateway)?;
            let deleted = commands::delete_prefix(&gateway, &prefix, &folder).await?;
            println!("deleted {}", deleted.len());
        }
        Command::Clear => {
            let folder = commands::resolve_folder(None, &gateway)?;
            let deleted = commands::clear(&gateway, &folder).await?;
            println!("deleted {}", deleted.len());
        }
        Command::Check => {
            let count = commands::check(&gateway).await?;
            println!("ok ({} visible)", count);
        }
    }

    Ok(())
}

//! contentstore Tool Binary
//!
//! Inspect and maintain a content store directory from the command line.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use contentstore::{compact, ContentStore, Result, StoreConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Bytes read from the input per `store_part_bytes` call
const PUT_CHUNK_SIZE: usize = 64 * 1024;

/// contentstore Tool
#[derive(Parser, Debug)]
#[command(name = "contentstore-tool")]
#[command(about = "Inspect and maintain a block-compressed content store")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./contentstore_data")]
    dir: PathBuf,

    /// Bytes mapped past the end of the TOC while writing it
    #[arg(long, default_value = "1000000")]
    write_map_reserve: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show entry and block statistics
    Info,

    /// Print a document, or a character range of it
    Get {
        /// Document id
        id: i32,

        /// First character (inclusive)
        #[arg(long, default_value = "-1", allow_negative_numbers = true)]
        start: i32,

        /// Last character (exclusive)
        #[arg(long, default_value = "-1", allow_negative_numbers = true)]
        end: i32,
    },

    /// Store a document and print its id
    Put {
        /// Read the document from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Create a new store, wiping any existing one
        #[arg(long)]
        create: bool,
    },

    /// Delete a document
    Delete {
        /// Document id
        id: i32,
    },

    /// Rewrite the store without the blocks of deleted documents
    Compact,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,contentstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("contentstore tool v{}", contentstore::VERSION);
    tracing::info!("Store directory: {}", args.dir.display());

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = StoreConfig::builder()
        .write_map_reserve(args.write_map_reserve)
        .build();

    match args.command {
        Commands::Info => {
            let store = ContentStore::open_with_config(&args.dir, false, false, config)?;
            let stats = store.stats();
            println!("entries:         {}", stats.entries);
            println!("deleted entries: {}", stats.deleted_entries);
            println!("total blocks:    {}", stats.total_blocks);
            println!("free blocks:     {}", stats.free_blocks);
            println!("stored chars:    {}", stats.stored_chars);
            println!("stored bytes:    {}", stats.stored_bytes);
            store.close()
        }
        Commands::Get { id, start, end } => {
            let store = ContentStore::open_with_config(&args.dir, false, false, config)?;
            match store.retrieve_part(id, start, end)? {
                Some(text) => println!("{}", text),
                None => tracing::warn!("Document {} not found", id),
            }
            store.close()
        }
        Commands::Put { file, create } => {
            let mut input: Box<dyn Read> = match file {
                Some(path) => Box::new(File::open(path)?),
                None => Box::new(io::stdin().lock()),
            };
            let mut store = ContentStore::open_with_config(&args.dir, true, create, config)?;
            let mut chunk = vec![0u8; PUT_CHUNK_SIZE];
            loop {
                let n = input.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                store.store_part_bytes(&chunk[..n])?;
            }
            let id = store.store_bytes(&[])?;
            println!("{}", id);
            store.close()
        }
        Commands::Delete { id } => {
            let mut store = ContentStore::open_with_config(&args.dir, true, false, config)?;
            if !store.delete(id)? {
                tracing::warn!("Document {} was not deleted", id);
            }
            store.close()
        }
        Commands::Compact => {
            let report = compact(&args.dir, &config)?;
            println!(
                "{} documents, {} tombstones, {} -> {} blocks",
                report.documents, report.tombstones, report.blocks_before, report.blocks_after
            );
            Ok(())
        }
    }
}

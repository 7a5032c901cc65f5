//! ChainKV CLI
//!
//! Command-line interface for a ChainKV table on local disk.

use std::path::PathBuf;
use std::process;

use chainkv::{Config, Record, Table};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// ChainKV CLI
#[derive(Parser, Debug)]
#[command(name = "chainkv-cli")]
#[command(about = "CLI for the ChainKV embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./chainkv_data")]
    data_dir: PathBuf,

    /// Database name
    #[arg(long, default_value = "default")]
    database: String,

    /// Table name
    #[arg(short, long, default_value = "main")]
    table: String,

    /// Slots per index shard
    #[arg(long, default_value = "100003")]
    shard_capacity: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key to a scalar value
    Put {
        key: String,
        value: String,
    },

    /// Push an item onto the list at a key
    PutList {
        key: String,
        item: String,
    },

    /// Add a member to the set at a key
    PutSet {
        key: String,
        member: String,
    },

    /// Get the full value of a key
    Get {
        key: String,
    },

    /// Get the newest record of a key without its value chain
    Head {
        key: String,
    },

    /// Delete a key
    Delete {
        key: String,
    },

    /// Print every live record
    Scan {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show table statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chainkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .database(&args.database)
        .shard_capacity(args.shard_capacity)
        .build();

    let mut table = match Table::open(&config, &args.table) {
        Ok(table) => table,
        Err(e) => {
            tracing::error!("Failed to open table {}: {}", args.table, e);
            process::exit(1);
        }
    };

    let outcome = run(&mut table, args.command);
    let closed = table.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(table: &mut Table, command: Commands) -> chainkv::Result<()> {
    match command {
        Commands::Put { key, value } => {
            let position = table.put(Record::new(key, value))?;
            println!("OK {}", position);
        }
        Commands::PutList { key, item } => {
            let position = table.put_list(&key, &item)?;
            println!("OK {}", position);
        }
        Commands::PutSet { key, member } => {
            let position = table.put_set(&key, &member)?;
            println!("OK {}", position);
        }
        Commands::Get { key } => match table.get(&key)? {
            Some(record) => println!("{}", record.value),
            None => println!("(nil)"),
        },
        Commands::Head { key } => match table.get_head_only(&key)? {
            Some((record, _)) => println!("{}", record),
            None => println!("(nil)"),
        },
        Commands::Delete { key } => {
            let deleted = table.delete(&key)?;
            println!("{}", if deleted { "DELETED" } else { "(nil)" });
        }
        Commands::Scan { limit } => {
            let mut count = 0;
            for record in table.scanner().take(limit.unwrap_or(usize::MAX)) {
                let record = record?;
                println!("{}\t{}", record.key, record.value);
                count += 1;
            }
            tracing::debug!("Scanned {} records", count);
        }
        Commands::Stats => {
            println!("table:  {}", table.name());
            println!("dir:    {}", table.dir().display());
            println!("log:    {} bytes", table.store().len());
            println!("keys:   {}", table.key_count());
            for index in table.indexer().shards() {
                println!(
                    "shard {:06}: {}/{} keys, {} slots",
                    index.id(),
                    index.load(),
                    index.max_keys(),
                    index.capacity()
                );
            }
        }
    }
    Ok(())
}

//! lsmkv CLI
//!
//! Command-line interface for inspecting and editing an lsmkv data directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lsmkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// lsmkv CLI
#[derive(Parser, Debug)]
#[command(name = "lsmkv-cli")]
#[command(about = "CLI for the lsmkv storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./lsmkv_data")]
    data_dir: String,

    /// MemTable size in KB before flush
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kb: u64,

    /// Disable the write-ahead log
    #[arg(long)]
    no_wal: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List live entries in key order
    Scan {
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,

        /// Exclusive upper bound
        #[arg(long)]
        to: Option<String>,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Write the memtable to an SSTable
    Flush,

    /// Merge all SSTables into one
    Compact,

    /// Show table and memtable statistics
    Stats,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> lsmkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .flush_threshold_bytes(args.memtable_kb * 1024)
        .wal_enabled(!args.no_wal)
        .build();

    tracing::debug!("lsmkv CLI v{}", lsmkv::VERSION);
    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { from, to, limit } => {
            let entries = engine.range(
                from.as_deref().map(str::as_bytes),
                to.as_deref().map(str::as_bytes),
            )?;
            for entry in entries.take(limit.unwrap_or(usize::MAX)) {
                let value = entry.value.unwrap_or_default();
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&entry.key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Flush => {
            engine.flush()?;
            println!("OK");
        }
        Commands::Compact => {
            engine.compact()?;
            println!("OK");
        }
        Commands::Stats => {
            let tables = engine.tables();
            println!("data_dir:        {}", engine.data_dir().display());
            println!("memtable_bytes:  {}", engine.memtable_size());
            println!("pending_flushes: {}", engine.pending_flushes());
            println!("sstables:        {}", tables.len());
            for table in tables.tables() {
                println!(
                    "  {}  entries={}  bytes={}",
                    table.file_name(),
                    table.len(),
                    table.file_size()
                );
            }
        }
    }

    engine.close()
}

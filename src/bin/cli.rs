//! L2DB CLI
//!
//! Command-line interface for inspecting and editing L2DB files.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use l2db::{Config, Database, OpenMode, Source, TypeTag, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// L2DB CLI
#[derive(Parser, Debug)]
#[command(name = "l2db")]
#[command(about = "Inspect and edit L2DB key-value files")]
#[command(version)]
struct Args {
    /// Database file
    file: PathBuf,

    /// Access mode letters: r (read), w (write), f (unbuffered file access)
    #[arg(short, long)]
    mode: Option<OpenMode>,

    /// Accept files whose magic bytes don't match
    #[arg(long)]
    lenient: bool,

    /// Use 8-byte index offsets if the file gets created
    #[arg(long)]
    wide: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,

        /// Convert the value to this type before printing
        #[arg(short = 't', long = "type")]
        as_type: Option<TypeTag>,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value, as text
        value: String,

        /// Store the value as this type (str by default)
        #[arg(short = 't', long = "type")]
        as_type: Option<TypeTag>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Copy every entry of another database file into this one
    Merge {
        /// The database to merge from
        other: PathBuf,
    },

    /// Delete every key that another database file contains
    Subtract {
        /// The database whose keys are removed
        other: PathBuf,
    },

    /// Print every entry
    Dump {
        /// Print a JSON object instead of one line per key
        #[arg(long)]
        json: bool,
    },

    /// Repair corrupted entries and compact the value block
    Cleanup {
        /// Only clear the dirty flag
        #[arg(long)]
        only_flag: bool,

        /// Remove corrupted entries instead of repairing them
        #[arg(long)]
        discard: bool,
    },

    /// Show header fields
    Info,

    /// Set the advisory LOCKED flag
    Lock,

    /// Clear the advisory LOCKED flag
    Unlock,
}

impl Commands {
    fn needs_write(&self) -> bool {
        matches!(
            self,
            Commands::Set { .. }
                | Commands::Del { .. }
                | Commands::Merge { .. }
                | Commands::Subtract { .. }
                | Commands::Cleanup { .. }
                | Commands::Lock
                | Commands::Unlock
        )
    }
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,l2db=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> l2db::Result<()> {
    let mode = args.mode.unwrap_or_else(|| {
        if args.command.needs_write() {
            OpenMode::read_write()
        } else {
            OpenMode::read_only()
        }
    });

    let config = Config::builder()
        .mode(mode)
        .strict(!args.lenient)
        .wide_index(args.wide)
        .build();

    tracing::debug!("Opening {} (mode {})", args.file.display(), mode);
    let mut db = Database::open(Source::Path(args.file), config)?;

    match args.command {
        Commands::Get { key, as_type } => {
            println!("{}", db.read(&key, as_type)?);
        }
        Commands::Set { key, value, as_type } => {
            db.write(&key, Value::Str(value), as_type)?;
        }
        Commands::Del { key } => {
            db.delete(&key)?;
        }
        Commands::Merge { other } => {
            let merged = db.extend(Source::Path(other))?;
            println!("merged {} entries", merged);
        }
        Commands::Subtract { other } => {
            let read_only = Config::builder()
                .mode(OpenMode::read_only())
                .strict(!args.lenient)
                .build();
            let keys = Database::open(Source::Path(other), read_only)?.keys()?;
            println!("removed {} keys", db.remove_keys(&keys)?);
        }
        Commands::Dump { json } => {
            let entries = db.dump()?;
            if json {
                let text = serde_json::to_string_pretty(&entries)
                    .map_err(|e| l2db::L2dbError::Syntax(format!("JSON export failed: {}", e)))?;
                println!("{}", text);
            } else {
                for (key, value) in &entries {
                    println!("{} ({}) = {}", key, value.type_tag(), value);
                }
            }
        }
        Commands::Cleanup { only_flag, discard } => {
            let report = db.cleanup(only_flag, discard)?;
            println!(
                "repaired {}, discarded {}, reclaimed {} bytes",
                report.repaired, report.discarded, report.reclaimed_bytes
            );
        }
        Commands::Info => {
            let header = *db.header();
            println!("version:     {}", header.version);
            println!("index bytes: {}", header.index_len);
            println!("value bytes: {}", db.value_block_len()?);
            println!("entries:     {}", db.len()?);
            println!("wide index:  {}", header.is_wide());
            println!("dirty:       {}", header.is_dirty());
            println!("locked:      {}", header.is_locked());
        }
        Commands::Lock => db.set_locked(true)?,
        Commands::Unlock => db.set_locked(false)?,
    }

    db.close()
}

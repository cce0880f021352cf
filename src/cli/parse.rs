//! CLI parse: clap types for bsonrestore. No behavior; definitions only.

use clap::Parser;
use std::path::PathBuf;

/// bsonrestore - restore a BSON dump tree into a live server
#[derive(Parser, Debug)]
#[command(name = "bsonrestore")]
#[command(about = "Restore a BSON dump directory, optionally replaying its oplog")]
pub struct Cli {
    /// Dump root: a directory tree or a single data file
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Dump root (same as the positional argument)
    #[arg(long = "dir", value_name = "DIR", conflicts_with = "dir")]
    pub dir_flag: Option<PathBuf>,

    /// Connection string of the target server
    #[arg(long)]
    pub uri: Option<String>,

    /// Database to restore into
    #[arg(short = 'd', long)]
    pub db: Option<String>,

    /// Collection to restore into (requires --db)
    #[arg(short = 'c', long, requires = "db")]
    pub collection: Option<String>,

    /// Drop each collection before restoring it
    #[arg(long)]
    pub drop: bool,

    /// Don't create collections with the options recorded in metadata files
    #[arg(long)]
    pub no_options_restore: bool,

    /// Don't build the indexes recorded in metadata files
    #[arg(long)]
    pub no_index_restore: bool,

    /// Keep the index format version recorded in the dump
    #[arg(long)]
    pub keep_index_version: bool,

    /// Wait for this many replicas after each write
    #[arg(short = 'w', long = "w", value_name = "N")]
    pub write_concern: Option<u32>,

    /// Replay the dump's oplog.bson after restoring collections
    #[arg(long)]
    pub oplog_replay: bool,

    /// Only replay oplog entries older than this timestamp
    #[arg(long, value_name = "SECS[:INC]")]
    pub oplog_limit: Option<String>,

    /// Extra JSON match conditions for replayed oplog entries
    #[arg(long, value_name = "JSON")]
    pub oplog_filter: Option<String>,

    /// Only restore documents matching this JSON predicate
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Dump root given on the command line, positional or flag
    pub fn directory(&self) -> Option<&PathBuf> {
        self.dir.as_ref().or(self.dir_flag.as_ref())
    }
}

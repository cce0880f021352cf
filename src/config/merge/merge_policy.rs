//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key, so a file that only sets
/// `restore.drop` keeps every other default.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("connection.uri", "mongodb://localhost:27017")?
        .set_default("connection.app_name", "bsonrestore")?
        .set_default("restore.directory", "dump")?
        .set_default("restore.drop", false)?
        .set_default("restore.restore_options", true)?
        .set_default("restore.restore_indexes", true)?
        .set_default("restore.keep_index_version", false)?
        .set_default("restore.write_concern", 0)?
        .set_default("restore.oplog_replay", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}

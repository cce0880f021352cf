//! Environment source: `BSONRESTORE__<SECTION>__<KEY>` variables.
//!
//! For example `BSONRESTORE__RESTORE__DROP=true` or
//! `BSONRESTORE__CONNECTION__URI=mongodb://replica:27017`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

/// Add environment variables to builder; they override every file source.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("BSONRESTORE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}

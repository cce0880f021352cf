//! Configuration layering: defaults, global file, explicit file, environment, CLI

use crate::integration::test_utils::with_isolated_env;
use bsonrestore::cli::{Cli, RunContext};
use bsonrestore::config::{global_config_path, ConfigLoader};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_global(config_home: &TempDir, text: &str) {
    let dir = config_home.path().join("bsonrestore");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), text).unwrap();
}

#[test]
fn test_defaults_without_any_source() {
    let home = TempDir::new().unwrap();
    with_isolated_env(home.path(), &[], || {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.restore.directory, PathBuf::from("dump"));
        assert_eq!(config.restore.write_concern, 0);
        assert_eq!(config.logging.output, "stderr");
    });
}

#[test]
fn test_global_file_is_read_from_xdg_config_home() {
    let home = TempDir::new().unwrap();
    write_global(
        &home,
        r#"
[connection]
uri = "mongodb://global:27017"

[restore]
write_concern = 2
"#,
    );

    with_isolated_env(home.path(), &[], || {
        assert_eq!(
            global_config_path().unwrap(),
            home.path().join("bsonrestore").join("config.toml")
        );
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.connection.uri, "mongodb://global:27017");
        assert_eq!(config.restore.write_concern, 2);
        assert!(config.restore.restore_indexes);
    });
}

#[test]
fn test_explicit_file_overrides_global_file() {
    let home = TempDir::new().unwrap();
    write_global(&home, "[restore]\nwrite_concern = 2\ndrop = true\n");
    let explicit = home.path().join("explicit.toml");
    fs::write(&explicit, "[restore]\nwrite_concern = 5\n").unwrap();

    with_isolated_env(home.path(), &[], || {
        let config = ConfigLoader::load_from_file(&explicit).unwrap();
        assert_eq!(config.restore.write_concern, 5);
        assert!(config.restore.drop, "unset keys fall through to the global file");
    });
}

#[test]
fn test_environment_overrides_files() {
    let home = TempDir::new().unwrap();
    write_global(&home, "[restore]\nwrite_concern = 2\n");

    with_isolated_env(
        home.path(),
        &[
            ("BSONRESTORE__RESTORE__WRITE_CONCERN", "3"),
            ("BSONRESTORE__RESTORE__DROP", "true"),
        ],
        || {
            let config = ConfigLoader::load().unwrap();
            assert_eq!(config.restore.write_concern, 3);
            assert!(config.restore.drop);
        },
    );
}

#[test]
fn test_cli_overrides_environment() {
    let home = TempDir::new().unwrap();

    with_isolated_env(
        home.path(),
        &[("BSONRESTORE__RESTORE__WRITE_CONCERN", "3")],
        || {
            let cli = Cli::try_parse_from(["bsonrestore", "/backups/a", "-w", "1"]).unwrap();
            let ctx = RunContext::new(&cli).unwrap();
            assert_eq!(ctx.config().restore.write_concern, 1);
            assert_eq!(ctx.config().restore.directory, PathBuf::from("/backups/a"));
        },
    );
}

#[test]
fn test_missing_explicit_file_fails() {
    let home = TempDir::new().unwrap();
    with_isolated_env(home.path(), &[], || {
        let cli = Cli::try_parse_from([
            "bsonrestore",
            "--config",
            home.path().join("absent.toml").to_str().unwrap(),
        ])
        .unwrap();
        assert!(RunContext::new(&cli).is_err());
    });
}

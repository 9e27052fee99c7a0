// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use clap::Parser;
use std::{path::PathBuf, sync::LazyLock};

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "mailstore",
    about = "Mailbox storage and session engine behind an IMAP-serving mail store.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailstore log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailstore"
    )]
    pub mailstore_log_level: String,

    /// Emit ANSI color codes in log output (default: true)
    #[clap(
        long,
        default_value_t = true,
        env,
        action = clap::ArgAction::Set,
        help = "Enable ANSI colors in log output"
    )]
    pub mailstore_ansi_logs: bool,

    /// Root data directory for backend stores (default: "./mailstore-data")
    #[clap(
        long,
        default_value = "./mailstore-data",
        env,
        help = "Set the root data directory for backend stores"
    )]
    pub mailstore_data_dir: PathBuf,

    /// Cache size in bytes for the document-store backend (default: 128MB)
    #[clap(
        long,
        env,
        help = "Set the cache size in bytes for the document-store backend"
    )]
    pub mailstore_db_cache_size: Option<usize>,

    /// Mailbox hierarchy delimiter (default: '.')
    #[clap(
        long,
        default_value = ".",
        env,
        help = "Set the mailbox hierarchy delimiter"
    )]
    pub mailstore_delimiter: char,
}

impl Settings {
    pub fn new_for_test() -> Self {
        Settings {
            mailstore_log_level: "debug".into(),
            mailstore_ansi_logs: false,
            mailstore_data_dir: std::env::temp_dir().join("mailstore-test"),
            mailstore_db_cache_size: None,
            mailstore_delimiter: '.',
        }
    }

    pub fn maildir_root(&self) -> PathBuf {
        self.mailstore_data_dir.join("maildir")
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.mailstore_data_dir.join("mailstore.db")
    }

    pub fn document_db_path(&self) -> PathBuf {
        self.mailstore_data_dir.join("store.db")
    }
}

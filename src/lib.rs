//! plurkdump - Plurk timeline archiver and activity charts
//!
//! Walks a Plurk timeline backward in time through the OAuth1 API, stores
//! plurks, replies and users in `SQLite`, and renders a stacked monthly
//! activity chart per user.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`client`] - Authenticated HTTP client for the Plurk API
//! - [`oauth`] - OAuth1 request signing and the verifier prompt
//! - [`storage`] - `SQLite` store with whole-row upserts
//! - [`sync`] - Backward pagination loop
//! - [`activity`] - Month bucketing and the gap-filled pivot table
//! - [`chart`] - PNG rendering of the activity table

pub mod activity;
pub mod chart;
pub mod cli;
pub mod client;
pub mod config;
pub mod date_parser;
pub mod error;
pub mod logging;
pub mod model;
pub mod oauth;
pub mod storage;
pub mod sync;

pub use activity::{ActivityCount, ActivityTable};
pub use chart::{ChartOptions, Palette};
pub use cli::*;
pub use client::{Session, authenticate};
pub use config::Config;
pub use error::{PlurkError, Result, find_closest_match, format_error};
pub use model::*;
pub use oauth::{ConsumerCredentials, StdinVerifier, TokenPair, VerifierPrompt};
pub use storage::Storage;
pub use sync::{PlurkApi, SyncOutcome, SyncReport, Syncer};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "plurks.db";

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://www.plurk.com";

/// Plurks requested per timeline page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Get the default data directory for plurkdump
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("plurkdump")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

//! # Overview
//!
//! `logging` centralises the verbosity and category gating the protocol
//! engines use for wire-level chatter, mirroring lftp's `ProtoLog`: every
//! session can be told "log categories X, Y at debug level N" independently
//! of the process-wide log level, and each engine tags its own lines with a
//! [`Category`] so a caller watching only `Category::Cmd` doesn't drown in
//! raw data-channel bytes.
//!
//! # Design
//!
//! - [`Category`] enumerates the chatter kinds a protocol engine produces
//!   (command lines, protocol replies, raw transfer bytes, connection
//!   lifecycle, cache/pool bookkeeping).
//! - [`VerbosityConfig`] holds a per-category minimum level; [`log_line`] is
//!   the single entry point every engine calls, and forwards to `tracing`
//!   when the configured level admits the line.
//! - Actual line rendering and output sinks are left to whatever `tracing`
//!   subscriber the embedding application installs; this crate only decides
//!   *whether* a line should be emitted and at what `tracing` level.
//!
//! # Invariants
//!
//! - `log_line` never panics and never blocks; a disabled category is a
//!   cheap integer compare.
//! - Raising a category's level only ever emits a superset of what a lower
//!   level emits.

use std::sync::atomic::{AtomicU8, Ordering};

/// A chatter category a protocol engine tags its log lines with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Category {
    /// Control-channel commands sent to the remote end.
    Cmd,
    /// Raw protocol replies received from the remote end.
    Proto,
    /// Byte-level transfer progress (rarely wanted above level 8).
    Xfer,
    /// Connection lifecycle: connect, reconnect, backoff, TLS handshake.
    Conn,
    /// Response cache hits/misses/evictions.
    Cache,
    /// Connection-pool reuse and takeover decisions.
    Pool,
}

impl Category {
    const COUNT: usize = 6;

    const fn index(self) -> usize {
        match self {
            Category::Cmd => 0,
            Category::Proto => 1,
            Category::Xfer => 2,
            Category::Conn => 3,
            Category::Cache => 4,
            Category::Pool => 5,
        }
    }
}

/// Per-category minimum verbosity level (0-9, lftp's `debug` command range).
#[derive(Debug)]
pub struct VerbosityConfig {
    levels: [AtomicU8; Category::COUNT],
}

impl Default for VerbosityConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VerbosityConfig {
    /// Creates a config with every category silenced (level 0).
    #[must_use]
    pub fn new() -> Self {
        Self {
            levels: Default::default(),
        }
    }

    /// Sets the minimum level at which `category` lines are emitted.
    pub fn set_level(&self, category: Category, level: u8) {
        self.levels[category.index()].store(level, Ordering::Relaxed);
    }

    /// Returns the currently configured level for `category`.
    #[must_use]
    pub fn level(&self, category: Category) -> u8 {
        self.levels[category.index()].load(Ordering::Relaxed)
    }

    /// Reports whether a line at `level` in `category` would be emitted.
    #[must_use]
    pub fn admits(&self, category: Category, level: u8) -> bool {
        level <= self.level(category) && self.level(category) > 0
    }
}

/// Convenience constructor mirroring lftp's `set cmd:verbose <n>` idiom:
/// enables every category up to `level`.
#[must_use]
pub fn uniform(level: u8) -> VerbosityConfig {
    let config = VerbosityConfig::new();
    for category in [
        Category::Cmd,
        Category::Proto,
        Category::Xfer,
        Category::Conn,
        Category::Cache,
        Category::Pool,
    ] {
        config.set_level(category, level);
    }
    config
}

/// Emits a single log line if `config` admits `category` at `level`.
///
/// `site` identifies the session the line belongs to (e.g. `user@host`) so
/// interleaved sessions remain distinguishable in the output.
pub fn log_line(config: &VerbosityConfig, category: Category, level: u8, site: &str, line: &str) {
    if !config.admits(category, level) {
        return;
    }
    match category {
        Category::Cmd | Category::Proto => {
            tracing::debug!(target: "xfer::wire", site, category = ?category, level, "{line}");
        }
        Category::Xfer => {
            tracing::trace!(target: "xfer::bytes", site, level, "{line}");
        }
        Category::Conn => {
            tracing::info!(target: "xfer::conn", site, level, "{line}");
        }
        Category::Cache | Category::Pool => {
            tracing::debug!(target: "xfer::resource", site, category = ?category, level, "{line}");
        }
    }
}

#[cfg(feature = "tracing-init")]
/// Installs a default `tracing-subscriber` suitable for CLI embedders.
pub fn init_default_subscriber() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_silences_everything() {
        let config = VerbosityConfig::new();
        assert!(!config.admits(Category::Cmd, 1));
        assert_eq!(config.level(Category::Proto), 0);
    }

    #[test]
    fn set_level_admits_up_to_and_including() {
        let config = VerbosityConfig::new();
        config.set_level(Category::Conn, 3);
        assert!(config.admits(Category::Conn, 1));
        assert!(config.admits(Category::Conn, 3));
        assert!(!config.admits(Category::Conn, 4));
    }

    #[test]
    fn uniform_enables_all_categories() {
        let config = uniform(5);
        assert!(config.admits(Category::Cache, 5));
        assert!(config.admits(Category::Pool, 5));
        assert!(!config.admits(Category::Pool, 6));
    }

    #[test]
    fn log_line_does_not_panic_when_disabled() {
        let config = VerbosityConfig::new();
        log_line(&config, Category::Xfer, 9, "ftp.example.com", "RETR file.bin");
    }
}

//! Run configuration type definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Read from a live store, write to a dump target.
    Backup,

    /// Read from a dump, write back into a live store.
    Restore,
}

/// Root run configuration. Built once before any I/O, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Transfer direction.
    pub mode: Mode,

    /// Source descriptor, consumed by the source adapter. Also used to
    /// derive the checkpoint source identifier.
    #[serde(default)]
    pub input: String,

    /// Sink descriptor, consumed by the sink adapter.
    #[serde(default)]
    pub output: String,

    /// Page size: maximum documents per fetch (default: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Starting offset into the source (default: 0).
    #[serde(default)]
    pub offset: u64,

    /// Maximum writes outstanding at once. 0 means unbounded; production
    /// configurations should set a finite value, since this cap is the
    /// engine's only backpressure control.
    #[serde(default)]
    pub concurrency: usize,

    /// Rate-window length in milliseconds. 0 disables the rate window.
    #[serde(default, alias = "concurrencyInterval")]
    pub concurrency_interval: u64,

    /// Maximum write submissions per rate window. 0 means unlimited.
    #[serde(default, alias = "intervalCap")]
    pub interval_cap: usize,

    /// Whether writes still running at window rollover count against the
    /// next window's budget.
    #[serde(default, alias = "carryoverConcurrencyCount")]
    pub carryover_concurrency_count: bool,

    /// Delay in milliseconds between pages (default: none).
    #[serde(default, alias = "throttleInterval")]
    pub throttle_interval: u64,

    /// Tolerate fetch and write failures instead of aborting the run.
    /// Transform failures are never tolerated.
    #[serde(default, alias = "ignore-errors")]
    pub ignore_errors: bool,

    /// Transform specifications: one entry or an ordered list. Each entry
    /// is either a plugin reference (`@name?k=v`) or an inline script.
    #[serde(default, deserialize_with = "one_or_many")]
    pub transform: Vec<String>,

    /// Where the progress checkpoint is written (default: ./checkpoint.json).
    #[serde(default = "default_checkpoint_path", alias = "checkpointPath")]
    pub checkpoint_path: PathBuf,

    /// Forward engine events to the default tracing-backed sink when no
    /// custom event sink is attached (default: true).
    #[serde(default = "default_true", alias = "toLog")]
    pub to_log: bool,

    /// Connection-pool settings handed to the source/sink adapters.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl RunConfig {
    /// Minimal configuration for the given direction and endpoints;
    /// every other knob keeps its default.
    pub fn new(mode: Mode, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            mode,
            input: input.into(),
            output: output.into(),
            limit: default_limit(),
            offset: 0,
            concurrency: 0,
            concurrency_interval: 0,
            interval_cap: 0,
            carryover_concurrency_count: false,
            throttle_interval: 0,
            ignore_errors: false,
            transform: Vec::new(),
            checkpoint_path: default_checkpoint_path(),
            to_log: true,
            pool: PoolConfig::default(),
        }
    }

    /// Inter-page throttle delay as a duration.
    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_interval)
    }

    /// Rate-window length as a duration.
    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.concurrency_interval)
    }
}

/// Connection-pool configuration passed to concrete adapters.
///
/// Replaces process-wide socket tuning: adapters receive their pool limits
/// explicitly instead of mutating global state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum connections an adapter may open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl PoolConfig {
    /// Effective pool size with the fallback default applied.
    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(8)
    }
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(spec) => vec![spec],
        OneOrMany::Many(specs) => specs,
    })
}

// Default value functions for serde

fn default_limit() -> usize {
    100
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./checkpoint.json")
}

fn default_true() -> bool {
    true
}

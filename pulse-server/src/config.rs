// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Command line and environment configuration.
//!
//! Every flag has a `PULSE_*` environment fallback. [`Args`] is converted
//! into [`Settings`], which carries the library configuration structs.

use crate::error::ServerError;
use clap::{Parser, ValueEnum};
use pulse::StreamId;
use pulse_pipeline::{BufferConfig, QueryConfig, RetryStrategy};
use pulse_scoring::{BaselinePolicy, ScoringConfig, ScoringModel};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Pulse ingestion and anomaly query server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "PULSE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// JSON lines store file (in-memory store when unset)
    #[arg(long, env = "PULSE_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Baseline checkpoint file, restored at start and saved at shutdown
    #[arg(long, env = "PULSE_CHECKPOINT_PATH")]
    pub checkpoint_path: Option<PathBuf>,

    /// Stream used when neither payload nor delivery names one
    #[arg(long, env = "PULSE_DEFAULT_STREAM", default_value = pulse::DEFAULT_STREAM)]
    pub default_stream: String,

    /// Pending records that trigger a store write
    #[arg(long, env = "PULSE_BATCH_SIZE", default_value = "500")]
    pub batch_size: usize,

    /// Background flush interval in milliseconds
    #[arg(long, env = "PULSE_FLUSH_INTERVAL_MS", default_value = "1000")]
    pub flush_interval_ms: u64,

    /// Committed keys remembered for redelivery detection
    #[arg(long, env = "PULSE_DEDUP_CAPACITY", default_value = "100000")]
    pub dedup_capacity: usize,

    /// Store write retries after the first attempt
    #[arg(long, env = "PULSE_RETRY_MAX", default_value = "5")]
    pub retry_max: u32,

    /// First retry delay in milliseconds (doubles per retry)
    #[arg(long, env = "PULSE_RETRY_INITIAL_MS", default_value = "50")]
    pub retry_initial_ms: u64,

    /// Retry delay cap in milliseconds
    #[arg(long, env = "PULSE_RETRY_MAX_DELAY_MS", default_value = "5000")]
    pub retry_max_delay_ms: u64,

    /// Tail probability at or below which a point is anomalous
    #[arg(long, env = "PULSE_THRESHOLD", default_value = "0.01")]
    pub threshold: f64,

    /// Baseline model
    #[arg(long, env = "PULSE_MODEL", value_enum, default_value = "ewma")]
    pub model: ModelKind,

    /// EWMA decay factor
    #[arg(long, env = "PULSE_ALPHA", default_value = "0.1")]
    pub alpha: f64,

    /// Sliding window size (window model)
    #[arg(long, env = "PULSE_WINDOW_SIZE", default_value = "60")]
    pub window_size: usize,

    /// Which scored points feed the baseline
    #[arg(long, env = "PULSE_BASELINE_POLICY", value_enum, default_value = "include-all")]
    pub baseline_policy: PolicyKind,

    /// Points a baseline needs before it may flag anything
    #[arg(long, env = "PULSE_MIN_SAMPLES", default_value = "2")]
    pub min_samples: u64,

    /// Floor applied to the baseline spread
    #[arg(long, env = "PULSE_MIN_SPREAD", default_value = "1e-6")]
    pub min_spread: f64,

    /// Results returned when a query gives no limit
    #[arg(long, env = "PULSE_DEFAULT_LIMIT", default_value = "100")]
    pub default_limit: usize,

    /// Largest limit a query may ask for
    #[arg(long, env = "PULSE_MAX_LIMIT", default_value = "10000")]
    pub max_limit: usize,

    /// Query read window in seconds (whole history when unset)
    #[arg(long, env = "PULSE_LOOKBACK_SECS")]
    pub lookback_secs: Option<u64>,

    /// Deadline for every HTTP call in milliseconds
    #[arg(long, env = "PULSE_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PULSE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Baseline model selector.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Ewma,
    Window,
}

/// Baseline policy selector.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    IncludeAll,
    ExcludeAnomalies,
}

/// Where records are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    JsonLines(PathBuf),
}

/// Validated server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub store: StoreBackend,
    pub checkpoint_path: Option<PathBuf>,
    pub default_stream: StreamId,
    pub request_timeout: Duration,
    pub scoring: ScoringConfig,
    pub buffer: BufferConfig,
    pub query: QueryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreBackend::Memory,
            checkpoint_path: None,
            default_stream: StreamId::default(),
            request_timeout: Duration::from_secs(10),
            scoring: ScoringConfig::default(),
            buffer: BufferConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Args {
    /// Convert and validate.
    pub fn into_settings(self) -> Result<Settings, ServerError> {
        let default_stream = StreamId::parse(&self.default_stream)
            .map_err(|e| ServerError::Config(format!("--default-stream: {}", e)))?;

        if self.batch_size == 0 {
            return Err(ServerError::Config("--batch-size must be positive".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ServerError::Config(
                "--flush-interval-ms must be positive".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ServerError::Config(
                "--request-timeout-ms must be positive".into(),
            ));
        }
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(ServerError::Config(
                "--default-limit and --max-limit must be positive".into(),
            ));
        }

        let model = match self.model {
            ModelKind::Ewma => ScoringModel::Ewma { alpha: self.alpha },
            ModelKind::Window => ScoringModel::Window {
                size: self.window_size,
            },
        };
        let policy = match self.baseline_policy {
            PolicyKind::IncludeAll => BaselinePolicy::IncludeAll,
            PolicyKind::ExcludeAnomalies => BaselinePolicy::ExcludeAnomalies,
        };
        let scoring = ScoringConfig {
            threshold: self.threshold,
            model,
            policy,
            min_samples: self.min_samples,
            min_spread: self.min_spread,
        };
        scoring.validate()?;

        Ok(Settings {
            bind: self.bind,
            store: match self.store_path {
                Some(path) => StoreBackend::JsonLines(path),
                None => StoreBackend::Memory,
            },
            checkpoint_path: self.checkpoint_path,
            default_stream,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            scoring,
            buffer: BufferConfig {
                max_batch_size: self.batch_size,
                flush_interval: Duration::from_millis(self.flush_interval_ms),
                dedup_capacity: self.dedup_capacity,
                retry: RetryStrategy::exponential(
                    self.retry_max,
                    Duration::from_millis(self.retry_initial_ms),
                    Duration::from_millis(self.retry_max_delay_ms),
                ),
            },
            query: QueryConfig {
                default_limit: self.default_limit,
                max_limit: self.max_limit,
                lookback: self.lookback_secs.map(Duration::from_secs),
            },
        })
    }
}

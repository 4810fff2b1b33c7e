//! Hit/miss and warm-failure reporting

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use crate::error::Error;
use crate::keys::DerivedKey;
use crate::stats::CacheStats;

/// How a call was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from the store
    Hit,
    /// Computed and stored
    Miss,
    /// Recomputed because the scope forced it
    Refresh,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Hit => f.write_str("hit"),
            Outcome::Miss => f.write_str("miss"),
            Outcome::Refresh => f.write_str("refresh"),
        }
    }
}

/// Structured activity event
#[derive(Debug)]
pub enum ActivityEvent<'a> {
    /// A cached or memoized call completed
    Call {
        /// How it was served
        outcome: Outcome,
        /// Member name
        member: &'a str,
        /// Key before and after hashing
        key: &'a DerivedKey,
    },
    /// A participant's warm entry point failed
    WarmFailure {
        /// Participant type name
        participant: &'static str,
        /// Failure detail
        error: &'a Error,
    },
}

/// Receives activity events
pub trait ActivitySink: Send + Sync {
    /// Handle one event
    fn record(&self, event: &ActivityEvent<'_>);
}

/// Default sink: hit/miss events through `tracing` at info level.
///
/// Warm failures are already logged at error level by
/// [`ActivityLog::warm_failure`], so this sink ignores them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ActivitySink for TracingSink {
    fn record(&self, event: &ActivityEvent<'_>) {
        match event {
            ActivityEvent::Call {
                outcome,
                member,
                key,
            } => {
                info!(
                    target: "forgetmenot::activity",
                    member = *member,
                    key = %key.readable,
                    digest = %key.key,
                    "cache {}",
                    outcome
                );
            }
            ActivityEvent::WarmFailure { .. } => {}
        }
    }
}

/// Statistics plus an optional, switchable sink
pub struct ActivityLog {
    enabled: AtomicBool,
    sink: RwLock<Arc<dyn ActivitySink>>,
    stats: CacheStats,
}

impl ActivityLog {
    /// Log writing to [`TracingSink`]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            sink: RwLock::new(Arc::new(TracingSink)),
            stats: CacheStats::new(),
        }
    }

    /// Turn hit/miss reporting on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether hit/miss events reach the sink
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Replace the sink
    pub fn set_sink(&self, sink: Arc<dyn ActivitySink>) {
        *self.sink.write() = sink;
    }

    /// Counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Record a completed call
    pub fn call(&self, outcome: Outcome, member: &str, key: &DerivedKey) {
        match outcome {
            Outcome::Hit => self.stats.record_hit(),
            Outcome::Miss => self.stats.record_miss(),
            Outcome::Refresh => self.stats.record_refresh(),
        }
        if self.is_enabled() {
            let sink = self.sink.read().clone();
            sink.record(&ActivityEvent::Call {
                outcome,
                member,
                key,
            });
        }
    }

    /// Record a warm failure. It is logged at error level and reaches the
    /// sink whether or not hit/miss reporting is enabled.
    pub fn warm_failure(&self, participant: &'static str, error: &Error) {
        self.stats.record_warm_failure();
        error!(
            target: "forgetmenot::activity",
            participant,
            "cache warm failed: {}",
            error
        );
        let sink = self.sink.read().clone();
        sink.record(&ActivityEvent::WarmFailure { participant, error });
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(false)
    }
}

//! Retry accounting.
//!
//! Two independent mechanisms:
//! - [`RetryBudget`]: the per-run budget shared by validation failures and
//!   recoverable tool failures. Exhaustion ends the run.
//! - [`TransportRetryPolicy`]: bounded exponential backoff for transient model
//!   client errors. Never touches the shared budget.

use std::fmt;
use std::time::Duration;

use agentry_config::TransportConfig;

/// What consumed a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Final answer did not match the result schema
    Validation,
    /// A tool asked the model to try again
    SoftRetry,
    /// Tool arguments failed coercion
    ArgumentCoercion,
    /// The model called a tool again after it reported an error
    ToolReinvocation,
    /// Neither text nor tool calls
    EmptyResponse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::SoftRetry => "soft_retry",
            FailureKind::ArgumentCoercion => "argument_coercion",
            FailureKind::ToolReinvocation => "tool_reinvocation",
            FailureKind::EmptyResponse => "empty_response",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryRecord {
    pub kind: FailureKind,
    pub detail: String,
}

impl RetryRecord {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Terminal failure after the budget ran out
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub max_retries: u32,
    /// Failures that consumed a retry, oldest first
    pub attempts: Vec<RetryRecord>,
    /// The failure that found the budget empty
    pub last: RetryRecord,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exceeded maximum retries ({}); last failure [{}]: {}",
            self.max_retries, self.last.kind, self.last.detail
        )?;
        for (i, record) in self.attempts.iter().enumerate() {
            write!(f, "\n  retry {} [{}]: {}", i + 1, record.kind, record.detail)?;
        }
        Ok(())
    }
}

/// Per-run retry budget
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max: u32,
    remaining: u32,
    history: Vec<RetryRecord>,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
            history: Vec::new(),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.max - self.remaining
    }

    pub fn history(&self) -> &[RetryRecord] {
        &self.history
    }

    /// Spend one retry, or fail if none are left
    pub fn consume(
        &mut self,
        kind: FailureKind,
        detail: impl Into<String>,
    ) -> Result<(), RunFailure> {
        let record = RetryRecord::new(kind, detail);
        if self.remaining == 0 {
            return Err(RunFailure {
                max_retries: self.max,
                attempts: self.history.clone(),
                last: record,
            });
        }
        self.remaining -= 1;
        self.history.push(record);
        Ok(())
    }
}

/// Exponential backoff for transient model errors
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_coefficient: f64,
}

impl Default for TransportRetryPolicy {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl TransportRetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_coefficient: 1.0,
        }
    }

    /// Same delay between every attempt
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: delay,
            max_backoff: delay,
            backoff_coefficient: 1.0,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        let nanos = (self.initial_backoff.as_nanos() as f64 * exp).round();
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(nanos as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl From<&TransportConfig> for TransportRetryPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_coefficient: config.backoff_coefficient,
        }
    }
}

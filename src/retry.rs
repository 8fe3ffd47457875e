//! Retry policy: the decision made after a request attempt fails against one
//! coordinator (`spec.md` §7).
use std::fmt;

use crate::protocol::{
    response::{ErrorDetail, ResponseError},
    Consistency,
};

/// What the execution engine should do next after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the same statement on the same host, optionally at a different
    /// consistency level.
    Retry(Option<Consistency>),
    /// Retry the same statement, but ask the planner for the next host.
    RetryNextHost,
    /// Treat the failure as a non-error: the caller sees an empty result.
    Ignore,
    /// Give up and surface the error to the caller.
    Rethrow,
}

/// Why a request failed against one attempted host, recorded for
/// [`NoHostAvailable`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("operation timed out")]
    Timeout,
    #[error("authentication error: {0}")]
    Authentication(String),
}

/// All planned hosts were exhausted without a successful response
/// (`spec.md` §7). Carries the reason recorded for each attempted host, in
/// attempt order.
///
/// Hand-rolled rather than `#[derive(thiserror::Error)]`: its `Display`
/// writes one line per attempted host from a runtime-sized `Vec`, which
/// thiserror's per-variant format-string attribute cannot express.
#[derive(Debug, Clone, Default)]
pub struct NoHostAvailable {
    pub tried_hosts: Vec<(std::net::SocketAddr, AttemptError)>,
}

impl NoHostAvailable {
    pub fn push(&mut self, addr: std::net::SocketAddr, err: AttemptError) {
        self.tried_hosts.push((addr, err));
    }

    pub fn is_empty(&self) -> bool {
        self.tried_hosts.is_empty()
    }
}

impl fmt::Display for NoHostAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no host available, tried {} host(s)", self.tried_hosts.len())?;
        for (addr, err) in &self.tried_hosts {
            write!(f, "\n  {addr}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for NoHostAvailable {}

/// What kind of failure the retry policy is being asked to adjudicate.
#[derive(Debug, Clone)]
pub enum RetryReason<'a> {
    ReadTimeout { consistency: Consistency, received: i32, block_for: i32, data_present: bool },
    WriteTimeout { consistency: Consistency, received: i32, block_for: i32, write_type: &'a str },
    Unavailable { consistency: Consistency, required: i32, alive: i32 },
    /// Any other server `ERROR` response not covered by a dedicated variant.
    Other(&'a ResponseError),
}

impl<'a> RetryReason<'a> {
    /// Classify a server `ERROR` response into a [`RetryReason`].
    pub fn from_response(err: &'a ResponseError) -> Self {
        match &err.detail {
            ErrorDetail::ReadTimeout { consistency, received, block_for, data_present } => {
                RetryReason::ReadTimeout {
                    consistency: *consistency,
                    received: *received,
                    block_for: *block_for,
                    data_present: *data_present,
                }
            }
            ErrorDetail::WriteTimeout { consistency, received, block_for, write_type } => {
                RetryReason::WriteTimeout {
                    consistency: *consistency,
                    received: *received,
                    block_for: *block_for,
                    write_type,
                }
            }
            ErrorDetail::Unavailable { consistency, required, alive } => RetryReason::Unavailable {
                consistency: *consistency,
                required: *required,
                alive: *alive,
            },
            _ => RetryReason::Other(err),
        }
    }
}

/// Whether the statement being retried is idempotent, which gates retry
/// after a transport failure (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub idempotent: bool,
    /// How many times this statement has already been retried.
    pub retry_count: u32,
}

/// A pluggable retry policy (`spec.md` §7). Implementations must be stateless
/// with respect to any single decision; retry counting is the caller's job.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    fn on_read_timeout(&self, reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision;
    fn on_write_timeout(&self, reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision;
    fn on_unavailable(&self, reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision;
    /// A transport-level failure (socket error, connection defunct).
    fn on_request_error(&self, ctx: RetryContext) -> RetryDecision {
        if ctx.idempotent {
            RetryDecision::RetryNextHost
        } else {
            RetryDecision::Rethrow
        }
    }
}

/// The default retry policy (`spec.md` §7):
/// - read timeout: retry once on the same host if the server had already
///   collected enough responses (`received >= block_for`) but the
///   coordinator had not yet assembled the data.
/// - write timeout: retry only if the write was a batch-log write.
/// - unavailable: retry once, moving to the next host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn on_read_timeout(&self, reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision {
        if ctx.retry_count > 0 {
            return RetryDecision::Rethrow;
        }
        match reason {
            RetryReason::ReadTimeout { received, block_for, data_present, .. }
                if received >= block_for && !data_present =>
            {
                RetryDecision::Retry(None)
            }
            _ => RetryDecision::Rethrow,
        }
    }

    fn on_write_timeout(&self, reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision {
        if ctx.retry_count > 0 {
            return RetryDecision::Rethrow;
        }
        match reason {
            RetryReason::WriteTimeout { write_type, .. } if *write_type == "BATCH_LOG" => {
                RetryDecision::Retry(None)
            }
            _ => RetryDecision::Rethrow,
        }
    }

    fn on_unavailable(&self, _reason: &RetryReason<'_>, ctx: RetryContext) -> RetryDecision {
        if ctx.retry_count > 0 {
            RetryDecision::Rethrow
        } else {
            RetryDecision::RetryNextHost
        }
    }
}

/// Never retries; every server error and transport failure is surfaced
/// verbatim (`spec.md` §7).
#[derive(Debug, Clone, Copy, Default)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn on_read_timeout(&self, _reason: &RetryReason<'_>, _ctx: RetryContext) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_write_timeout(&self, _reason: &RetryReason<'_>, _ctx: RetryContext) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_unavailable(&self, _reason: &RetryReason<'_>, _ctx: RetryContext) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_request_error(&self, _ctx: RetryContext) -> RetryDecision {
        RetryDecision::Rethrow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(idempotent: bool, retry_count: u32) -> RetryContext {
        RetryContext { idempotent, retry_count }
    }

    #[test]
    fn default_retries_read_timeout_when_data_missing_but_enough_responses() {
        let reason = RetryReason::ReadTimeout { consistency: Consistency::Quorum, received: 2, block_for: 2, data_present: false };
        assert_eq!(DefaultRetryPolicy.on_read_timeout(&reason, ctx(true, 0)), RetryDecision::Retry(None));
    }

    #[test]
    fn default_does_not_retry_read_timeout_twice() {
        let reason = RetryReason::ReadTimeout { consistency: Consistency::Quorum, received: 2, block_for: 2, data_present: false };
        assert_eq!(DefaultRetryPolicy.on_read_timeout(&reason, ctx(true, 1)), RetryDecision::Rethrow);
    }

    #[test]
    fn default_retries_write_timeout_only_for_batch_log() {
        let batch_log = RetryReason::WriteTimeout { consistency: Consistency::One, received: 0, block_for: 1, write_type: "BATCH_LOG" };
        assert_eq!(DefaultRetryPolicy.on_write_timeout(&batch_log, ctx(true, 0)), RetryDecision::Retry(None));

        let simple = RetryReason::WriteTimeout { consistency: Consistency::One, received: 0, block_for: 1, write_type: "SIMPLE" };
        assert_eq!(DefaultRetryPolicy.on_write_timeout(&simple, ctx(true, 0)), RetryDecision::Rethrow);
    }

    #[test]
    fn default_retries_unavailable_once_on_next_host() {
        let reason = RetryReason::Unavailable { consistency: Consistency::Quorum, required: 2, alive: 1 };
        assert_eq!(DefaultRetryPolicy.on_unavailable(&reason, ctx(true, 0)), RetryDecision::RetryNextHost);
        assert_eq!(DefaultRetryPolicy.on_unavailable(&reason, ctx(true, 1)), RetryDecision::Rethrow);
    }

    #[test]
    fn fallthrough_never_retries() {
        let reason = RetryReason::Unavailable { consistency: Consistency::Quorum, required: 2, alive: 1 };
        assert_eq!(FallthroughRetryPolicy.on_unavailable(&reason, ctx(true, 0)), RetryDecision::Rethrow);
    }

    #[test]
    fn non_idempotent_statement_does_not_retry_transport_errors() {
        assert_eq!(DefaultRetryPolicy.on_request_error(ctx(false, 0)), RetryDecision::Rethrow);
        assert_eq!(DefaultRetryPolicy.on_request_error(ctx(true, 0)), RetryDecision::RetryNextHost);
    }
}

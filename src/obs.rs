//! Optional observability helpers for transactions and rate limiting.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `txguard.transaction` with a `stage` field, an
//!   `error` event when an automatic rollback fails, and a `debug` event on rate-limit denial.
//! - Enable `metrics` to increment `txguard_rpc_total` for every transaction procedure
//!   attempt/success/failure (labeled by `procedure` + `outcome`) and
//!   `txguard_rate_limit_total` for every limiter decision (labeled by `decision`).

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Outcome labels recorded for each remote procedure call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcOutcome {
	/// Call dispatched.
	Attempt,
	/// Backend accepted the call.
	Success,
	/// Backend or transport reported a failure.
	Failure,
}
impl RpcOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RpcOutcome::Attempt => "attempt",
			RpcOutcome::Success => "success",
			RpcOutcome::Failure => "failure",
		}
	}
}
impl Display for RpcOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Decision labels recorded by the rate limiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitOutcome {
	/// Request counted and allowed.
	Allowed,
	/// Request rejected; window budget exhausted.
	Denied,
}
impl RateLimitOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RateLimitOutcome::Allowed => "allowed",
			RateLimitOutcome::Denied => "denied",
		}
	}
}
impl Display for RateLimitOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

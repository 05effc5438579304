//! Crate-level error types shared across the transaction runner, RPC transport, and config.

// self
use crate::_prelude::*;

/// Boxed error used for caller-supplied and transport-specific failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Stage at which a transaction failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionFailure {
	/// `begin_transaction` failed; the operation never ran.
	Begin,
	/// The operation succeeded but `commit_transaction` failed.
	Commit,
	/// A manual `rollback_transaction` call failed.
	Rollback,
	/// The operation itself failed.
	Operation,
}
impl TransactionFailure {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TransactionFailure::Begin => "begin",
			TransactionFailure::Commit => "commit",
			TransactionFailure::Rollback => "rollback",
			TransactionFailure::Operation => "operation",
		}
	}
}
impl Display for TransactionFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Single error kind returned by [`TransactionRunner::run`](crate::transaction::TransactionRunner::run).
///
/// `rollback_succeeded` distinguishes "rolled back cleanly" (`Some(true)`) from "rollback
/// itself failed" (`Some(false)`). The latter may leave data in an undefined state and
/// callers must treat it as fatal to the request. `None` means no automatic rollback was
/// attempted.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct TransactionError {
	/// Stage that failed.
	pub kind: TransactionFailure,
	/// Human-readable summary.
	pub message: String,
	/// Underlying failure, if any.
	#[source]
	pub cause: Option<BoxError>,
	/// Outcome of the automatic rollback, when one was attempted.
	pub rollback_succeeded: Option<bool>,
}
impl TransactionError {
	/// Wraps a failed `begin_transaction` call.
	pub fn begin(cause: impl Into<BoxError>) -> Self {
		Self::with_cause(TransactionFailure::Begin, "Failed to begin transaction.", cause)
	}

	/// Wraps a failed `commit_transaction` call.
	pub fn commit(cause: impl Into<BoxError>) -> Self {
		Self::with_cause(TransactionFailure::Commit, "Failed to commit transaction.", cause)
	}

	/// Wraps a failed manual `rollback_transaction` call.
	pub fn rollback(cause: impl Into<BoxError>) -> Self {
		Self::with_cause(TransactionFailure::Rollback, "Failed to roll back transaction.", cause)
	}

	/// Wraps an operation failure together with the automatic rollback outcome.
	pub fn operation(cause: impl Into<BoxError>, rollback_succeeded: Option<bool>) -> Self {
		let message = match rollback_succeeded {
			Some(true) => "Transaction failed and was rolled back.",
			Some(false) => "Transaction failed and rollback also failed.",
			None => "Transaction failed after it was completed manually.",
		};

		Self {
			kind: TransactionFailure::Operation,
			message: message.into(),
			cause: Some(cause.into()),
			rollback_succeeded,
		}
	}

	fn with_cause(kind: TransactionFailure, message: &str, cause: impl Into<BoxError>) -> Self {
		Self { kind, message: message.into(), cause: Some(cause.into()), rollback_succeeded: None }
	}

	/// Returns `true` when the automatic rollback completed.
	pub fn is_rolled_back(&self) -> bool {
		self.rollback_succeeded == Some(true)
	}

	/// Returns `true` when the automatic rollback was attempted and failed.
	pub fn is_rollback_failure(&self) -> bool {
		self.rollback_succeeded == Some(false)
	}

	/// Downcasts the cause to a concrete error type.
	pub fn cause_as<E>(&self) -> Option<&E>
	where
		E: 'static + StdError,
	{
		self.cause.as_deref().and_then(|cause| cause.downcast_ref::<E>())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint URL cannot be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint must use HTTPS unless it points at a loopback host.
	#[error("The RPC endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint carries a query string or fragment.
	#[error("The RPC endpoint must not carry a query or fragment: {url}.")]
	EndpointNotBase {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// API key is missing or blank.
	#[error("An API key is required.")]
	MissingApiKey,
	/// Schema override is blank.
	#[error("Schema name must not be empty.")]
	InvalidSchema,
	/// Required environment variable is missing.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Primary variable name that was consulted.
		name: &'static str,
	},
	/// Rate limit window or limit is zero.
	#[error("Rate limit requires a positive window and at least one request per window.")]
	InvalidRateLimit,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(e: url::ParseError) -> Self {
		Self::InvalidEndpoint { source: e }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the RPC endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, ThisError)]
	#[error("Habitat insert violated a constraint.")]
	struct InsertFailed;

	#[test]
	fn operation_error_reports_rollback_outcome() {
		let clean = TransactionError::operation(InsertFailed, Some(true));
		let dirty = TransactionError::operation(InsertFailed, Some(false));
		let manual = TransactionError::operation(InsertFailed, None);

		assert!(clean.is_rolled_back());
		assert!(!clean.is_rollback_failure());
		assert!(dirty.is_rollback_failure());
		assert!(!manual.is_rolled_back() && !manual.is_rollback_failure());
		assert_eq!(clean.to_string(), "Transaction failed and was rolled back.");
		assert_eq!(dirty.to_string(), "Transaction failed and rollback also failed.");
	}

	#[test]
	fn cause_is_exposed_as_source_and_downcastable() {
		let err = TransactionError::operation(InsertFailed, Some(true));
		let source =
			StdError::source(&err).expect("Transaction error should expose its cause as source.");

		assert_eq!(source.to_string(), "Habitat insert violated a constraint.");
		assert!(err.cause_as::<InsertFailed>().is_some());
		assert!(err.cause_as::<std::io::Error>().is_none());
	}

	#[test]
	fn begin_error_keeps_stage_and_message() {
		let err = TransactionError::begin(InsertFailed);

		assert_eq!(err.kind, TransactionFailure::Begin);
		assert_eq!(err.rollback_succeeded, None);
		assert_eq!(err.to_string(), "Failed to begin transaction.");
	}
}

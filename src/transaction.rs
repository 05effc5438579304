//! RPC-backed transactions with automatic and manual completion.
//!
//! [`TransactionRunner::run`] issues `begin_transaction`, hands the operation a
//! [`TransactionContext`], then completes the transaction exactly once: automatically
//! (commit on `Ok`, rollback on `Err`) unless the operation already called
//! [`TransactionContext::commit`] or [`TransactionContext::rollback`]. Completion is
//! tracked as an explicit [`TransactionState`] and every transition is checked against
//! it, so repeated or mixed manual calls never reach the backend twice.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{BoxError, TransactionError},
	obs::{self, TransactionSpan},
	rpc::{self, Procedure, RpcClient, RpcError},
};
#[cfg(feature = "reqwest")]
use crate::{config::RpcConfig, rpc::ReqwestRpcClient};

/// Completion state of a single transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransactionState {
	#[default]
	/// Neither committed nor rolled back yet.
	Pending,
	/// Commit was issued.
	Committed,
	/// Rollback was issued.
	RolledBack,
}
impl TransactionState {
	/// Returns `true` once either completion has been issued.
	pub const fn is_completed(self) -> bool {
		!matches!(self, TransactionState::Pending)
	}
}

/// Runs operations inside RPC-backed transactions.
///
/// Clones share the client and the run guard, so transactions issued through any clone
/// are serialized. An operation must not call [`run`](Self::run) on the same runner; the
/// nested call would wait on the guard held by its caller.
#[derive(Clone)]
pub struct TransactionRunner {
	/// Client used for transaction-control procedures.
	pub client: Arc<dyn RpcClient>,
	run_guard: Arc<AsyncMutex<()>>,
}
impl TransactionRunner {
	/// Creates a runner over the provided client.
	pub fn new(client: Arc<dyn RpcClient>) -> Self {
		Self { client, run_guard: Default::default() }
	}

	/// Runs `operation` inside a transaction.
	///
	/// - `begin_transaction` failure returns [`TransactionFailure::Begin`] without invoking the
	///   operation.
	/// - `Ok` from a still-pending transaction triggers `commit_transaction`; its failure returns
	///   [`TransactionFailure::Commit`].
	/// - `Err` from a still-pending transaction triggers `rollback_transaction`; the returned
	///   [`TransactionFailure::Operation`] error carries the operation error as its cause and
	///   the rollback outcome in `rollback_succeeded`. A failed rollback is logged, never
	///   surfaced in place of the operation error.
	///
	/// [`TransactionFailure::Begin`]: crate::error::TransactionFailure::Begin
	/// [`TransactionFailure::Commit`]: crate::error::TransactionFailure::Commit
	/// [`TransactionFailure::Operation`]: crate::error::TransactionFailure::Operation
	pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, TransactionError>
	where
		F: FnOnce(TransactionContext) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Into<BoxError>,
	{
		let span = TransactionSpan::new("run");

		span.instrument(async move {
			let _serial = self.run_guard.lock().await;

			rpc::call_procedure(self.client.as_ref(), Procedure::BeginTransaction)
				.await
				.map_err(TransactionError::begin)?;

			let context = TransactionContext::new(self.client.clone());

			match operation(context.clone()).await {
				Ok(value) => {
					if context.transition(TransactionState::Committed) {
						rpc::call_procedure(self.client.as_ref(), Procedure::CommitTransaction)
							.await
							.map_err(TransactionError::commit)?;
					}

					Ok(value)
				},
				Err(e) => {
					let rollback_succeeded = if context.transition(TransactionState::RolledBack) {
						Some(self.auto_rollback().await)
					} else {
						None
					};

					Err(TransactionError::operation(e, rollback_succeeded))
				},
			}
		})
		.await
	}

	async fn auto_rollback(&self) -> bool {
		match rpc::call_procedure(self.client.as_ref(), Procedure::RollbackTransaction).await {
			Ok(()) => true,
			Err(e) => {
				obs::log_rollback_failure(&e);

				false
			},
		}
	}
}
#[cfg(feature = "reqwest")]
impl TransactionRunner {
	/// Creates a runner backed by the crate's reqwest RPC client.
	pub fn from_config(config: RpcConfig) -> Self {
		Self::new(Arc::new(ReqwestRpcClient::new(config)))
	}
}
impl Debug for TransactionRunner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransactionRunner").finish_non_exhaustive()
	}
}

/// Per-run handle passed to the operation.
///
/// Cloning is cheap; clones observe the same [`TransactionState`].
#[derive(Clone)]
pub struct TransactionContext {
	client: Arc<dyn RpcClient>,
	state: Arc<Mutex<TransactionState>>,
}
impl TransactionContext {
	fn new(client: Arc<dyn RpcClient>) -> Self {
		Self { client, state: Default::default() }
	}

	/// Returns the current completion state.
	pub fn state(&self) -> TransactionState {
		*self.state.lock()
	}

	/// Commits immediately. No-op once the transaction has been completed either way.
	pub async fn commit(&self) -> Result<(), TransactionError> {
		if self.transition(TransactionState::Committed) {
			rpc::call_procedure(self.client.as_ref(), Procedure::CommitTransaction)
				.await
				.map_err(TransactionError::commit)?;
		}

		Ok(())
	}

	/// Rolls back immediately. No-op once the transaction has been completed either way.
	pub async fn rollback(&self) -> Result<(), TransactionError> {
		if self.transition(TransactionState::RolledBack) {
			rpc::call_procedure(self.client.as_ref(), Procedure::RollbackTransaction)
				.await
				.map_err(TransactionError::rollback)?;
		}

		Ok(())
	}

	/// Invokes another procedure through the transaction's client.
	pub async fn call(&self, procedure: &str, params: &Value) -> Result<Value, RpcError> {
		self.client.call(procedure, params).await
	}

	// Claims the completion; only the first caller observes `true`.
	fn transition(&self, next: TransactionState) -> bool {
		let mut state = self.state.lock();

		if state.is_completed() {
			return false;
		}

		*state = next;

		true
	}
}
impl Debug for TransactionContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransactionContext").field("state", &self.state()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Default)]
	struct CountingClient {
		calls: Mutex<Vec<String>>,
	}
	impl RpcClient for CountingClient {
		fn call<'a>(&'a self, procedure: &'a str, _params: &'a Value) -> rpc::RpcFuture<'a> {
			self.calls.lock().push(procedure.to_owned());

			Box::pin(async { Ok(Value::Null) })
		}
	}

	#[test]
	fn state_reports_completion() {
		assert!(!TransactionState::Pending.is_completed());
		assert!(TransactionState::Committed.is_completed());
		assert!(TransactionState::RolledBack.is_completed());
		assert_eq!(TransactionState::default(), TransactionState::Pending);
	}

	#[tokio::test]
	async fn first_transition_wins() {
		let client = Arc::new(CountingClient::default());
		let context = TransactionContext::new(client.clone());

		context.rollback().await.expect("Manual rollback should succeed.");
		context.commit().await.expect("Commit after rollback should be a no-op.");
		context.rollback().await.expect("Second rollback should be a no-op.");

		assert_eq!(context.state(), TransactionState::RolledBack);
		assert_eq!(*client.calls.lock(), vec!["rollback_transaction".to_owned()]);
	}

	#[tokio::test]
	async fn clones_share_state() {
		let client = Arc::new(CountingClient::default());
		let context = TransactionContext::new(client.clone());
		let clone = context.clone();

		clone.commit().await.expect("Manual commit should succeed.");

		assert_eq!(context.state(), TransactionState::Committed);
		assert!(!context.transition(TransactionState::RolledBack));
	}
}

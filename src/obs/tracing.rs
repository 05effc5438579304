// self
use crate::_prelude::*;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedTransaction<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedTransaction<F> = F;

/// A span builder used around transaction runs.
#[derive(Clone, Debug)]
pub struct TransactionSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl TransactionSpan {
	/// Creates a new span tagged with the provided stage.
	pub fn new(stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("txguard.transaction", stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedTransaction<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs an automatic rollback failure; the original operation error still surfaces.
pub fn log_rollback_failure(err: &dyn StdError) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(
			error = %err,
			"automatic rollback failed; data may be left in an undefined state"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}

/// Logs a rate-limit denial for the given identifier.
pub fn log_rate_limit_denied(key: &str, reset_at: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(key, %reset_at, "rate limit exceeded");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, reset_at);
	}
}

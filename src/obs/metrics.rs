// self
use crate::{
	obs::{RateLimitOutcome, RpcOutcome},
	rpc::Procedure,
};

/// Records a transaction procedure outcome via the global metrics recorder (when enabled).
pub fn record_rpc_outcome(procedure: Procedure, outcome: RpcOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"txguard_rpc_total",
			"procedure" => procedure.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (procedure, outcome);
	}
}

/// Records a rate limiter decision via the global metrics recorder (when enabled).
pub fn record_rate_limit_outcome(outcome: RateLimitOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("txguard_rate_limit_total", "decision" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
	// crates.io
	use metrics::{
		Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
	};
	use parking_lot::Mutex;
	// self
	use super::*;

	// Captures `name{label=value,...}` for every counter registration.
	#[derive(Default)]
	struct CapturingRecorder(Mutex<Vec<String>>);
	impl CapturingRecorder {
		fn keys(&self) -> Vec<String> {
			self.0.lock().clone()
		}
	}
	impl Recorder for CapturingRecorder {
		fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

		fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

		fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

		fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
			let labels = key
				.labels()
				.map(|label| format!("{}={}", label.key(), label.value()))
				.collect::<Vec<_>>()
				.join(",");

			self.0.lock().push(format!("{}{{{labels}}}", key.name()));

			Counter::noop()
		}

		fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
			Gauge::noop()
		}

		fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
			Histogram::noop()
		}
	}

	#[test]
	fn counters_carry_procedure_outcome_and_decision_labels() {
		let recorder = CapturingRecorder::default();

		metrics::with_local_recorder(&recorder, || {
			record_rpc_outcome(Procedure::CommitTransaction, RpcOutcome::Failure);
			record_rate_limit_outcome(RateLimitOutcome::Denied);
		});

		assert_eq!(recorder.keys(), [
			"txguard_rpc_total{procedure=commit_transaction,outcome=failure}",
			"txguard_rate_limit_total{decision=denied}",
		]);
	}
}

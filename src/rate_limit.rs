//! In-memory fixed-window rate limiting keyed by caller identifier.
//!
//! Each identifier owns a [`RateLimitEntry`] counting requests until `reset_at`. The first
//! request after expiry starts a fresh window. State lives in one process; deployments with
//! several instances need a shared store behind [`RateLimitPolicy`] instead.

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, RateLimitOutcome},
};

/// Future resolving to a budget decision; boxed so policies stay object safe.
pub type RateLimitFuture<'a, Error> =
	Pin<Box<dyn Future<Output = Result<RateLimitDecision, Error>> + 'a + Send>>;

/// Request budget keyed by identifier.
///
/// [`RateLimiter`] answers from process memory and never fails. A budget kept in a shared
/// store (Redis, a Postgres table) implements this trait with its own `Error`.
pub trait RateLimitPolicy<Error>
where
	Self: Send + Sync,
{
	/// Counts one request for `context.key` at `context.observed_at`.
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_, Error>;
}

/// One request to be counted against a budget.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Identifier owning the budget, usually a user ID.
	pub key: String,
	/// Instant the request arrived; decides which window it falls in.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Request for `key` arriving now.
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into(), observed_at: OffsetDateTime::now_utc() }
	}

	/// Replays the request at `instant` instead of now.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Outcome of counting one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// Counted within the window's budget.
	Allow,
	/// Budget spent; not counted. Carries when the window resets.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Retry hint for a denied request, suitable for a `Retry-After` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// End of the window that denied the request.
	pub earliest_retry_at: OffsetDateTime,
	/// Time left in that window when the request was denied.
	pub recommended_backoff: Duration,
	/// Budget description shown to the caller.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Hint pointing at `earliest_retry_at`, `recommended_backoff` from now.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Attaches the budget description.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Window budget for a [`RateLimiter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Window length in milliseconds.
	pub window_ms: u64,
	/// Requests allowed per window.
	pub max_requests: u32,
}
impl RateLimitConfig {
	/// Budget for AI chat requests: 10 per minute.
	pub const fn chat() -> Self {
		Self { window_ms: 60_000, max_requests: 10 }
	}

	/// Budget for general API requests: 100 per minute.
	pub const fn api() -> Self {
		Self { window_ms: 60_000, max_requests: 100 }
	}

	/// Window length as a [`Duration`].
	pub fn window(&self) -> Duration {
		Duration::milliseconds(self.window_ms.min(i64::MAX as u64) as i64)
	}
}

/// Per-identifier counter for the current window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
	/// Requests counted in the current window.
	pub count: u32,
	/// Instant the window ends.
	pub reset_at: OffsetDateTime,
}
impl RateLimitEntry {
	/// Returns `true` once the window has ended at `now`.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now >= self.reset_at
	}
}

/// Fixed-window request counter keyed by identifier.
///
/// Every operation takes a short lock on the entry map, so one instance can be shared
/// across threads behind an `Arc`. Operations without the `_at` suffix observe
/// [`OffsetDateTime::now_utc`].
#[derive(Debug)]
pub struct RateLimiter {
	window: Duration,
	max_requests: u32,
	entries: RwLock<HashMap<String, RateLimitEntry>>,
}
impl RateLimiter {
	/// Creates a limiter allowing `max_requests` per `window`.
	pub fn new(window: Duration, max_requests: u32) -> Result<Self, ConfigError> {
		if !window.is_positive() || max_requests == 0 {
			return Err(ConfigError::InvalidRateLimit);
		}

		Ok(Self { window, max_requests, entries: Default::default() })
	}

	/// Creates a limiter from a [`RateLimitConfig`].
	pub fn from_config(config: RateLimitConfig) -> Result<Self, ConfigError> {
		Self::new(config.window(), config.max_requests)
	}

	/// Window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Requests allowed per window.
	pub fn max_requests(&self) -> u32 {
		self.max_requests
	}

	/// Counts a request for `key` and reports whether it may proceed.
	pub fn is_allowed(&self, key: &str) -> bool {
		self.is_allowed_at(key, OffsetDateTime::now_utc())
	}

	/// [`is_allowed`](Self::is_allowed) observed at `now`.
	pub fn is_allowed_at(&self, key: &str, now: OffsetDateTime) -> bool {
		self.consume(key, now).is_ok()
	}

	/// Counts a request for `key` and returns a decision carrying a retry hint on denial.
	pub fn check(&self, key: &str) -> RateLimitDecision {
		self.check_at(key, OffsetDateTime::now_utc())
	}

	/// [`check`](Self::check) observed at `now`.
	pub fn check_at(&self, key: &str, now: OffsetDateTime) -> RateLimitDecision {
		match self.consume(key, now) {
			Ok(_) => RateLimitDecision::Allow,
			Err(entry) => RateLimitDecision::Delay(
				RetryDirective::new(entry.reset_at, entry.reset_at - now)
					.with_reason(format!("{} requests per window exceeded", self.max_requests)),
			),
		}
	}

	/// Requests left in the current window; a full quota for unknown or expired keys.
	pub fn remaining_requests(&self, key: &str) -> u32 {
		self.remaining_requests_at(key, OffsetDateTime::now_utc())
	}

	/// [`remaining_requests`](Self::remaining_requests) observed at `now`.
	pub fn remaining_requests_at(&self, key: &str, now: OffsetDateTime) -> u32 {
		self.live_entry(key, now)
			.map_or(self.max_requests, |entry| self.max_requests.saturating_sub(entry.count))
	}

	/// Time until the window for `key` resets; zero for unknown or expired keys.
	pub fn time_until_reset(&self, key: &str) -> Duration {
		self.time_until_reset_at(key, OffsetDateTime::now_utc())
	}

	/// [`time_until_reset`](Self::time_until_reset) observed at `now`.
	pub fn time_until_reset_at(&self, key: &str, now: OffsetDateTime) -> Duration {
		self.live_entry(key, now).map_or(Duration::ZERO, |entry| entry.reset_at - now)
	}

	/// Snapshot of the live entry for `key`, if any.
	pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
		self.live_entry(key, OffsetDateTime::now_utc())
	}

	/// Drops the entry for `key`, restoring its full quota.
	pub fn reset(&self, key: &str) -> bool {
		self.entries.write().remove(key).is_some()
	}

	/// Deletes every expired entry and returns how many were removed.
	pub fn cleanup(&self) -> usize {
		self.cleanup_at(OffsetDateTime::now_utc())
	}

	/// [`cleanup`](Self::cleanup) observed at `now`.
	pub fn cleanup_at(&self, now: OffsetDateTime) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| !entry.is_expired(now));

		before - entries.len()
	}

	/// Number of tracked identifiers, expired entries included.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when no identifier is tracked.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	// Windows reaching past the representable calendar end there.
	fn window_end(&self, now: OffsetDateTime) -> OffsetDateTime {
		now.checked_add(self.window).unwrap_or(PrimitiveDateTime::MAX.assume_utc())
	}

	fn live_entry(&self, key: &str, now: OffsetDateTime) -> Option<RateLimitEntry> {
		self.entries.read().get(key).copied().filter(|entry| !entry.is_expired(now))
	}

	// `Ok` with the updated entry when counted, `Err` with the unchanged entry when denied.
	fn consume(&self, key: &str, now: OffsetDateTime) -> Result<RateLimitEntry, RateLimitEntry> {
		let outcome = {
			let mut entries = self.entries.write();

			match entries.get_mut(key).filter(|entry| !entry.is_expired(now)) {
				Some(entry) if entry.count < self.max_requests => {
					entry.count += 1;

					Ok(*entry)
				},
				Some(entry) => Err(*entry),
				None => {
					let entry = RateLimitEntry { count: 1, reset_at: self.window_end(now) };

					entries.insert(key.to_owned(), entry);

					Ok(entry)
				},
			}
		};

		match &outcome {
			Ok(_) => obs::record_rate_limit_outcome(RateLimitOutcome::Allowed),
			Err(entry) => {
				obs::record_rate_limit_outcome(RateLimitOutcome::Denied);
				obs::log_rate_limit_denied(key, entry.reset_at);
			},
		}

		outcome
	}
}
impl<E> RateLimitPolicy<E> for RateLimiter
where
	E: Send,
{
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_, E> {
		let decision = self.check_at(&context.key, context.observed_at);

		Box::pin(async move { Ok(decision) })
	}
}

/// Runs [`RateLimiter::cleanup`] every `every` on the current tokio runtime.
///
/// The task holds a weak reference and exits once the limiter is dropped. A zero
/// interval is raised to one millisecond.
#[cfg(feature = "tokio")]
pub fn spawn_sweeper(
	limiter: &Arc<RateLimiter>,
	every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
	let limiter = Arc::downgrade(limiter);
	let every = every.max(std::time::Duration::from_millis(1));

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every);

		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		// The first tick completes immediately.
		ticker.tick().await;

		loop {
			ticker.tick().await;

			let Some(limiter) = limiter.upgrade() else { break };

			limiter.cleanup();
		}
	})
}

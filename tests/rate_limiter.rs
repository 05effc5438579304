// std
use std::{convert::Infallible, thread};
// crates.io
use color_eyre::Result;
use time::{Duration, OffsetDateTime, macros};
// self
use txguard::rate_limit::{
	RateLimitConfig, RateLimitContext, RateLimitDecision, RateLimitPolicy, RateLimiter,
};

fn start() -> OffsetDateTime {
	macros::datetime!(2025-11-10 12:00 UTC)
}

fn limiter(max_requests: u32) -> RateLimiter {
	RateLimiter::new(Duration::seconds(60), max_requests)
		.expect("Rate limiter fixture should build.")
}

#[test]
fn presets_share_window_but_not_budget() -> Result<()> {
	let chat = RateLimiter::from_config(RateLimitConfig::chat())?;
	let api = RateLimiter::from_config(RateLimitConfig::api())?;

	assert_eq!(chat.window(), api.window());
	assert!(chat.max_requests() < api.max_requests());

	for _ in 0..chat.max_requests() {
		assert!(chat.is_allowed_at("user-1", start()));
	}

	assert!(!chat.is_allowed_at("user-1", start()));
	assert!(api.is_allowed_at("user-1", start()));

	Ok(())
}

#[test]
fn request_after_budget_is_denied() {
	for max in 1..=5 {
		let limiter = limiter(max);

		for n in 0..max {
			assert!(limiter.is_allowed_at("user-1", start()), "Request {n} of {max} should pass.");
		}

		assert!(
			!limiter.is_allowed_at("user-1", start()),
			"Request {} should be denied.",
			max + 1
		);
		assert_eq!(limiter.remaining_requests_at("user-1", start()), 0);
	}
}

#[test]
fn expired_window_restarts_count() {
	let limiter = limiter(3);
	let expired = start() + Duration::seconds(60);

	for _ in 0..3 {
		limiter.is_allowed_at("user-1", start());
	}

	assert_eq!(limiter.remaining_requests_at("user-1", expired), 3);
	assert_eq!(limiter.time_until_reset_at("user-1", expired), Duration::ZERO);
	assert!(limiter.is_allowed_at("user-1", expired));
	assert_eq!(limiter.remaining_requests_at("user-1", expired), 2);
	assert_eq!(limiter.time_until_reset_at("user-1", expired), Duration::seconds(60));
}

#[test]
fn identifiers_do_not_share_state() {
	let limiter = limiter(1);

	assert!(limiter.is_allowed_at("user-1", start()));
	assert!(!limiter.is_allowed_at("user-1", start()));
	assert!(limiter.is_allowed_at("user-2", start()));
	assert_eq!(limiter.remaining_requests_at("user-3", start()), 1);
	assert_eq!(limiter.time_until_reset_at("user-3", start()), Duration::ZERO);
}

#[test]
fn unknown_identifier_reports_full_quota() {
	let limiter = limiter(4);

	assert_eq!(limiter.remaining_requests("nobody"), 4);
	assert_eq!(limiter.time_until_reset("nobody"), Duration::ZERO);
	assert!(limiter.entry("nobody").is_none());
	assert!(limiter.is_empty());
}

#[test]
fn cleanup_only_removes_expired_entries() {
	let limiter = limiter(2);

	limiter.is_allowed_at("early", start());
	limiter.is_allowed_at("late", start() + Duration::seconds(45));

	assert_eq!(limiter.cleanup_at(start() + Duration::seconds(30)), 0);
	assert_eq!(limiter.cleanup_at(start() + Duration::seconds(60)), 1);
	assert_eq!(limiter.len(), 1);
	assert_eq!(limiter.remaining_requests_at("late", start() + Duration::seconds(60)), 1);
}

#[test]
fn concurrent_callers_never_exceed_budget() {
	let limiter = &limiter(50);
	let now = start();
	let allowed = thread::scope(|scope| {
		let handles = (0..8)
			.map(|_| {
				scope.spawn(move || {
					(0..20).filter(|_| limiter.is_allowed_at("shared", now)).count()
				})
			})
			.collect::<Vec<_>>();

		handles
			.into_iter()
			.map(|handle| handle.join().expect("Limiter thread should not panic."))
			.sum::<usize>()
	});

	assert_eq!(allowed, 50);
}

#[tokio::test]
async fn policy_evaluation_uses_observed_instant() {
	let limiter = limiter(1);
	let context = RateLimitContext::new("user-1").with_observed_at(start());
	let first = <RateLimiter as RateLimitPolicy<Infallible>>::evaluate(&limiter, &context)
		.await
		.expect("In-memory policy cannot fail.");
	let second = <RateLimiter as RateLimitPolicy<Infallible>>::evaluate(
		&limiter,
		&context.clone().with_observed_at(start() + Duration::seconds(15)),
	)
	.await
	.expect("In-memory policy cannot fail.");

	assert_eq!(first, RateLimitDecision::Allow);

	match second {
		RateLimitDecision::Delay(directive) => {
			assert_eq!(directive.earliest_retry_at, start() + Duration::seconds(60));
			assert_eq!(directive.recommended_backoff, Duration::seconds(45));
		},
		RateLimitDecision::Allow => panic!("Second request should be delayed."),
	}
}

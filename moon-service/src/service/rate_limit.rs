//! # Rate Limiters
//!
//! Two independent in-process stores:
//!
//! 1. **Per-principal token bucket** for authenticated requests. Capacity
//!    is the configured RPM, refill is RPM/60 tokens per second (minimum
//!    1/s), keyed by `(principal type, id)`. Successful checks surface
//!    `X-RateLimit-Limit/-Remaining/-Reset`; exhaustion yields 429 with
//!    `Retry-After`.
//! 2. **Login sliding window** keyed by `(client ip, username)`. The
//!    window opens at the first attempt and closes on expiry or on
//!    successful login.
//!
//! Both stores are mutex-guarded maps; the read-modify-write of a bucket
//! is atomic under the lock. Buckets back at full capacity are evicted by
//! a periodic sweep so the map stays bounded by recent active principals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use shared::auth::Principal;
use shared::config::RateLimitConfig;
use shared::errors::ApiError;

// =============================================================================
// Token Bucket
// =============================================================================

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn seconds_until(&self, tokens: f64) -> u64 {
        let missing = (tokens - self.tokens).max(0.0);
        (missing / self.refill_per_sec).ceil() as u64
    }
}

/// Outcome of a bucket check, carrying everything the middleware needs
/// for the response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// `X-RateLimit-Limit`
    pub limit: u32,
    /// `X-RateLimit-Remaining`
    pub remaining: u32,
    /// `X-RateLimit-Reset`: seconds until the bucket is full again
    pub reset_seconds: u64,
    /// `Retry-After` when denied
    pub retry_after_seconds: u64,
}

/// Per-principal request limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, String), Bucket>>,
    user_rpm: u32,
    apikey_rpm: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            user_rpm: config.user_rpm,
            apikey_rpm: config.apikey_rpm,
        }
    }

    fn rpm_for(&self, principal: &Principal) -> u32 {
        match principal.principal_type {
            shared::auth::PrincipalType::User => self.user_rpm,
            shared::auth::PrincipalType::ApiKey => self.apikey_rpm,
        }
    }

    /// Takes one token from the principal's bucket if available.
    pub fn check(&self, principal: &Principal) -> RateLimitDecision {
        self.check_at(principal, Instant::now())
    }

    /// Deterministic core, separated for tests.
    fn check_at(&self, principal: &Principal, now: Instant) -> RateLimitDecision {
        let rpm = self.rpm_for(principal);
        let capacity = rpm as f64;
        let refill = (rpm as f64 / 60.0).max(1.0);
        let key = (
            principal.principal_type.as_str().to_string(),
            principal.id.clone(),
        );

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(capacity, refill, now));
        bucket.refill(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                limit: rpm,
                remaining: bucket.tokens.floor() as u32,
                reset_seconds: bucket.seconds_until(bucket.capacity),
                retry_after_seconds: 0,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: rpm,
                remaining: 0,
                reset_seconds: bucket.seconds_until(bucket.capacity),
                retry_after_seconds: bucket.seconds_until(1.0).max(1),
            }
        }
    }

    /// Evicts buckets that have refilled to capacity; run every 5 minutes.
    pub fn evict_stale(&self) {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets.retain(|_, bucket| {
            bucket.refill(now);
            bucket.tokens < bucket.capacity
        });
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

// =============================================================================
// Login Sliding Window
// =============================================================================

#[derive(Debug, Clone)]
struct Window {
    started: Instant,
    attempts: u32,
}

/// Brute-force limiter for the login endpoint, keyed by (ip, username).
#[derive(Debug)]
pub struct LoginLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
    max_attempts: u32,
    window: Duration,
}

impl LoginLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_attempts: config.login_max_attempts,
            window: Duration::from_secs(config.login_window_seconds),
        }
    }

    /// Atomically records an attempt and decides whether it may proceed.
    ///
    /// ## Errors
    ///
    /// 429 with `Retry-After` once the window's budget is spent.
    pub fn check_and_record(&self, ip: &str, username: &str) -> Result<(), ApiError> {
        self.check_and_record_at(ip, username, Instant::now())
    }

    fn check_and_record_at(&self, ip: &str, username: &str, now: Instant) -> Result<(), ApiError> {
        let key = (ip.to_string(), username.to_string());
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = windows.entry(key).or_insert(Window {
            started: now,
            attempts: 0,
        });

        // The window restarts once the previous one has fully elapsed
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.attempts = 0;
        }

        if window.attempts >= self.max_attempts {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(window.started))
                .as_secs()
                .max(1);
            return Err(ApiError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }

        window.attempts += 1;
        Ok(())
    }

    /// Clears the failure history after a successful login.
    pub fn reset_for_user(&self, username: &str) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        windows.retain(|(_, user), _| user != username);
    }

    /// Drops fully elapsed windows; run alongside the bucket sweep.
    pub fn evict_stale(&self) {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        windows.retain(|_, window| now.duration_since(window.started) < self.window);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shared::auth::{PrincipalType, Role};

    fn config(user_rpm: u32) -> RateLimitConfig {
        RateLimitConfig {
            user_rpm,
            apikey_rpm: user_rpm * 2,
            login_max_attempts: 3,
            login_window_seconds: 60,
        }
    }

    fn principal(id: &str, kind: PrincipalType) -> Principal {
        Principal {
            id: id.to_string(),
            principal_type: kind,
            username: Some("alice".to_string()),
            role: Role::User,
            can_write: true,
        }
    }

    #[test]
    fn test_bucket_allows_up_to_capacity() {
        let limiter = RateLimiter::new(&config(5));
        let p = principal("u1", PrincipalType::User);
        let now = Instant::now();

        for i in 0..5 {
            let decision = limiter.check_at(&p, now);
            assert!(decision.allowed, "request {} should pass", i);
            assert_eq!(decision.limit, 5);
        }
        let denied = limiter.check_at(&p, now);
        assert!(!denied.allowed);
        assert!(denied.retry_after_seconds >= 1);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(&config(60)); // 1 token/sec
        let p = principal("u1", PrincipalType::User);
        let start = Instant::now();

        for _ in 0..60 {
            assert!(limiter.check_at(&p, start).allowed);
        }
        assert!(!limiter.check_at(&p, start).allowed);

        // Two seconds later two tokens are back
        let later = start + Duration::from_secs(2);
        assert!(limiter.check_at(&p, later).allowed);
        assert!(limiter.check_at(&p, later).allowed);
        assert!(!limiter.check_at(&p, later).allowed);
    }

    #[test]
    fn test_refill_rate_has_floor_of_one_per_second() {
        // 30 RPM would be 0.5 tokens/sec; the floor lifts it to 1/sec
        let limiter = RateLimiter::new(&config(30));
        let p = principal("u1", PrincipalType::User);
        let start = Instant::now();

        for _ in 0..30 {
            assert!(limiter.check_at(&p, start).allowed);
        }
        let denied = limiter.check_at(&p, start);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_seconds, 1);
    }

    #[test]
    fn test_principals_have_separate_buckets() {
        let limiter = RateLimiter::new(&config(1));
        let now = Instant::now();
        let alice = principal("u1", PrincipalType::User);
        let bob = principal("u2", PrincipalType::User);

        assert!(limiter.check_at(&alice, now).allowed);
        assert!(!limiter.check_at(&alice, now).allowed);
        assert!(limiter.check_at(&bob, now).allowed);
    }

    #[test]
    fn test_apikey_rpm_is_independent() {
        let limiter = RateLimiter::new(&config(1)); // apikey_rpm = 2
        let now = Instant::now();
        let key = principal("k1", PrincipalType::ApiKey);

        assert!(limiter.check_at(&key, now).allowed);
        assert!(limiter.check_at(&key, now).allowed);
        assert!(!limiter.check_at(&key, now).allowed);
    }

    #[test]
    fn test_eviction_removes_full_buckets() {
        let limiter = RateLimiter::new(&config(60));
        let p = principal("u1", PrincipalType::User);
        limiter.check(&p);
        assert_eq!(limiter.bucket_count(), 1);

        // Immediately after a draw the bucket is below capacity
        limiter.evict_stale();
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_login_window_limits_attempts() {
        let limiter = LoginLimiter::new(&config(60)); // 3 attempts / 60s
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_and_record_at("1.2.3.4", "admin", now).is_ok());
        }
        let err = limiter
            .check_and_record_at("1.2.3.4", "admin", now)
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
    }

    #[test]
    fn test_login_window_expires() {
        let limiter = LoginLimiter::new(&config(60));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_and_record_at("1.2.3.4", "admin", start).unwrap();
        }
        assert!(limiter.check_and_record_at("1.2.3.4", "admin", start).is_err());

        let after_window = start + Duration::from_secs(61);
        assert!(limiter
            .check_and_record_at("1.2.3.4", "admin", after_window)
            .is_ok());
    }

    #[test]
    fn test_login_keyed_by_ip_and_username() {
        let limiter = LoginLimiter::new(&config(60));
        let now = Instant::now();

        for _ in 0..3 {
            limiter.check_and_record_at("1.2.3.4", "admin", now).unwrap();
        }
        // Same username, different ip: separate window
        assert!(limiter.check_and_record_at("5.6.7.8", "admin", now).is_ok());
        // Same ip, different username: separate window
        assert!(limiter.check_and_record_at("1.2.3.4", "bob", now).is_ok());
    }

    #[test]
    fn test_successful_login_resets_window() {
        let limiter = LoginLimiter::new(&config(60));
        let now = Instant::now();

        for _ in 0..3 {
            limiter.check_and_record_at("1.2.3.4", "admin", now).unwrap();
        }
        assert!(limiter.check_and_record_at("1.2.3.4", "admin", now).is_err());

        limiter.reset_for_user("admin");
        assert!(limiter.check_and_record_at("1.2.3.4", "admin", now).is_ok());
    }
}

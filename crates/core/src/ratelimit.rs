use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use vitalcore_shared::ids::UserId;

type UserLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Per-user token-bucket quota guarding the HTTP surface (`spec.md` §2
/// "governor token-bucket quotas per user"). Limiters are created lazily so
/// memory use is proportional to active users, not configured capacity.
pub struct UserRateLimiter {
    limiters: DashMap<UserId, Arc<UserLimiter>>,
    quota: Quota,
}

impl UserRateLimiter {
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let burst = NonZeroU32::new(requests_per_minute.max(1)).unwrap();
        Self {
            limiters: DashMap::new(),
            quota: Quota::per_minute(burst),
        }
    }

    /// Returns `false` when the user has exceeded their quota and the
    /// request should be rejected with 429.
    pub fn check(&self, user: UserId) -> bool {
        let limiter = self
            .limiters
            .entry(user)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();
        limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_quota_and_rejects_beyond_it() {
        let limiter = UserRateLimiter::per_minute(2);
        let user = UserId::random();
        assert!(limiter.check(user));
        assert!(limiter.check(user));
        assert!(!limiter.check(user));
    }

    #[test]
    fn tracks_separate_budgets_per_user() {
        let limiter = UserRateLimiter::per_minute(1);
        let a = UserId::random();
        let b = UserId::random();
        assert!(limiter.check(a));
        assert!(limiter.check(b));
        assert!(!limiter.check(a));
    }
}

use std::time::Duration;

use crate::classify::FailureClass;

/// Cooldown durations for each failure class.
/// Exposed as a struct (rather than bare constants) so a host app can
/// override them, since a host app may
/// want these configurable.
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    pub transient_base: Duration,
    pub transient_cap: Duration,
    pub rate_limit_cap: Duration,
    pub permanent: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            transient_base: Duration::from_secs(30),
            transient_cap: Duration::from_secs(5 * 60),
            rate_limit_cap: Duration::from_secs(5 * 60),
            permanent: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CooldownPolicy {
    /// `consecutive_failures` is the counter value *after* incrementing for
    /// this failure (i.e. >= 1).
    pub fn cooldown_for(
        &self,
        class: FailureClass,
        consecutive_failures: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        match class {
            FailureClass::Transient => {
                let exp = self
                    .transient_base
                    .saturating_mul(1u32.checked_shl(consecutive_failures.saturating_sub(1)).unwrap_or(u32::MAX));
                exp.min(self.transient_cap)
            }
            FailureClass::RateLimit => {
                if let Some(retry_after) = retry_after {
                    retry_after
                } else {
                    let exp = self
                        .transient_base
                        .saturating_mul(1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX));
                    exp.min(self.rate_limit_cap)
                }
            }
            FailureClass::Permanent => self.permanent,
            FailureClass::UserAbort => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_backs_off_exponentially_until_cap() {
        let policy = CooldownPolicy::default();
        assert_eq!(
            policy.cooldown_for(FailureClass::Transient, 1, None),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.cooldown_for(FailureClass::Transient, 2, None),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.cooldown_for(FailureClass::Transient, 10, None),
            Duration::from_secs(5 * 60)
        );
    }

    #[test]
    fn rate_limit_honors_retry_after_verbatim() {
        let policy = CooldownPolicy::default();
        assert_eq!(
            policy.cooldown_for(FailureClass::RateLimit, 1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn permanent_is_24_hours() {
        let policy = CooldownPolicy::default();
        assert_eq!(
            policy.cooldown_for(FailureClass::Permanent, 1, None),
            Duration::from_secs(24 * 60 * 60)
        );
    }
}

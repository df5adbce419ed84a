use std::collections::HashMap;
use std::time::SystemTime;

use dispatch_common::ProfileId;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classify::FailureSignal;
use crate::cooldown::CooldownPolicy;
use crate::events::{EventHub, KeyEvent};
use crate::state::{KeyHealth, KeySlot, KeyState, UnavailableReason};

/// A key chosen for one dispatch attempt.
#[derive(Debug, Clone)]
pub struct Selection {
    pub slot: KeySlot,
    /// Every key for this profile is currently cooling/quarantined; the
    /// caller may still attempt the returned slot: it's the one closest
    /// to exiting cooldown, and the caller is told every key is impaired.
    pub all_impaired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoKeysConfigured;

/// Round-robin key selector with a per-(profile, key) cooldown/quarantine
/// state machine, keyed by `(ProfileId, key slot index)` since the Key
/// Manager operates entirely within one profile's ordered key list, not
/// across a whole provider's credential set.
pub struct KeyManager {
    profiles: RwLock<HashMap<ProfileId, Vec<KeyHealth>>>,
    policy: CooldownPolicy,
    events: EventHub,
}

impl KeyManager {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            policy,
            events: EventHub::default(),
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    async fn ensure_len(&self, profile_id: &ProfileId, key_count: usize) {
        let mut guard = self.profiles.write().await;
        let entry = guard.entry(profile_id.clone()).or_default();
        while entry.len() < key_count {
            entry.push(KeyHealth::default());
        }
    }

    /// Least-recently-used key whose cooldown has expired, tie-broken by
    /// list position. `key_count` is the profile's current
    /// `apiKeys.len()`; health records are created lazily to match it.
    pub async fn pick_key(
        &self,
        profile_id: &ProfileId,
        key_count: usize,
    ) -> Result<Selection, NoKeysConfigured> {
        if key_count == 0 {
            return Err(NoKeysConfigured);
        }
        self.ensure_len(profile_id, key_count).await;

        let now = Instant::now();
        let guard = self.profiles.read().await;
        let records = guard.get(profile_id).expect("ensured above");

        let available = records
            .iter()
            .take(key_count)
            .enumerate()
            .filter(|(_, health)| health.state.is_expired(now))
            .min_by_key(|(idx, health)| (health.usage_counter, *idx));

        if let Some((slot, _)) = available {
            return Ok(Selection {
                slot,
                all_impaired: false,
            });
        }

        // Every key is cooling/quarantined: pick whichever exits soonest.
        let (slot, _) = records
            .iter()
            .take(key_count)
            .enumerate()
            .min_by_key(|(_, health)| health.state.cooldown_until())
            .expect("key_count > 0");
        warn!(
            profile_id = %profile_id,
            "all keys impaired; selecting the one closest to recovery"
        );
        Ok(Selection {
            slot,
            all_impaired: true,
        })
    }

    /// Clears failure state and bumps the round-robin counter so this key
    /// moves to the back of the queue.
    pub async fn report_success(&self, profile_id: &ProfileId, slot: KeySlot) {
        let mut guard = self.profiles.write().await;
        if let Some(health) = guard.get_mut(profile_id).and_then(|v| v.get_mut(slot)) {
            health.consecutive_failures = 0;
            health.state = KeyState::Healthy;
            health.usage_counter = health.usage_counter.wrapping_add(1);
        }
        debug!(profile_id = %profile_id, slot, "key reported success");
    }

    /// Classifies `signal` and applies the resulting state transition.
    /// User-abort is a documented no-op: it never touches cooldown state.
    pub async fn report_failure(&self, profile_id: &ProfileId, slot: KeySlot, signal: &FailureSignal) {
        let class = signal.classify();
        let Some(reason) = class.unavailable_reason() else {
            debug!(profile_id = %profile_id, slot, "user abort; key health unchanged");
            return;
        };

        let (until, consecutive_failures) = {
            let mut guard = self.profiles.write().await;
            let Some(health) = guard.get_mut(profile_id).and_then(|v| v.get_mut(slot)) else {
                return;
            };
            health.consecutive_failures += 1;
            let cooldown =
                self.policy
                    .cooldown_for(class, health.consecutive_failures, signal.retry_after);
            let until = Instant::now() + cooldown;
            health.state = match reason {
                UnavailableReason::AuthInvalid => KeyState::Quarantined { until },
                _ => KeyState::Cooling { until, reason },
            };
            // Bump the counter too so a permanently-failing key doesn't
            // linger at the front of the round-robin once it recovers.
            health.usage_counter = health.usage_counter.wrapping_add(1);
            (until, health.consecutive_failures)
        };

        let until_wall = SystemTime::now()
            .checked_add(until.saturating_duration_since(Instant::now()))
            .unwrap_or_else(SystemTime::now);
        self.events.emit(KeyEvent::UnavailableStart {
            at: SystemTime::now(),
            profile_id: profile_id.clone(),
            slot,
            reason,
            until: until_wall,
        });
        warn!(
            profile_id = %profile_id,
            slot,
            ?reason,
            consecutive_failures,
            "key marked unavailable"
        );
    }

    pub async fn remove_profile(&self, profile_id: &ProfileId) {
        self.profiles.write().await.remove(profile_id);
    }

    #[cfg(test)]
    pub(crate) async fn state_of(&self, profile_id: &ProfileId, slot: KeySlot) -> Option<KeyState> {
        self.profiles
            .read()
            .await
            .get(profile_id)
            .and_then(|v| v.get(slot))
            .map(|h| h.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BodySignal;
    use std::time::Duration;

    fn profile_id() -> ProfileId {
        ProfileId::from("profile-a")
    }

    #[tokio::test]
    async fn round_robin_cycles_through_keys_in_order() {
        let mgr = KeyManager::new(CooldownPolicy::default());
        let pid = profile_id();
        let mut picks = Vec::new();
        for _ in 0..6 {
            let sel = mgr.pick_key(&pid, 3).await.unwrap();
            mgr.report_success(&pid, sel.slot).await;
            picks.push(sel.slot);
        }
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn abort_does_not_penalize_and_keeps_round_robin() {
        let mgr = KeyManager::new(CooldownPolicy::default());
        let pid = profile_id();

        let first = mgr.pick_key(&pid, 2).await.unwrap();
        let signal = FailureSignal {
            is_user_abort: true,
            ..Default::default()
        };
        mgr.report_failure(&pid, first.slot, &signal).await;

        let state = mgr.state_of(&pid, first.slot).await.unwrap();
        assert!(state.is_healthy());

        // A following pick still favors this same (never-bumped) slot.
        let second = mgr.pick_key(&pid, 2).await.unwrap();
        assert_eq!(second.slot, first.slot);
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after() {
        let mgr = KeyManager::new(CooldownPolicy::default());
        let pid = profile_id();
        let sel = mgr.pick_key(&pid, 1).await.unwrap();
        let signal = FailureSignal {
            status: Some(429),
            body_signal: Some(BodySignal::RateLimit),
            retry_after: Some(Duration::from_secs(7)),
            ..Default::default()
        };
        mgr.report_failure(&pid, sel.slot, &signal).await;
        let state = mgr.state_of(&pid, sel.slot).await.unwrap();
        match state {
            KeyState::Cooling { until, reason } => {
                assert_eq!(reason, UnavailableReason::RateLimit);
                let remaining = until.saturating_duration_since(Instant::now());
                assert!((remaining.as_millis() as i64 - 7000).abs() < 500);
            }
            other => panic!("expected Cooling, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_keys_cooling_reports_impaired_and_picks_soonest() {
        let mgr = KeyManager::new(CooldownPolicy::default());
        let pid = profile_id();
        for slot in 0..2 {
            let sig = FailureSignal {
                status: Some(500),
                ..Default::default()
            };
            // force both slots into the health map first
            let _ = mgr.pick_key(&pid, 2).await.unwrap();
            mgr.report_failure(&pid, slot, &sig).await;
        }
        let sel = mgr.pick_key(&pid, 2).await.unwrap();
        assert!(sel.all_impaired);
    }

    #[tokio::test]
    async fn permanent_failure_quarantines_key() {
        let mgr = KeyManager::new(CooldownPolicy::default());
        let pid = profile_id();
        let sel = mgr.pick_key(&pid, 1).await.unwrap();
        let sig = FailureSignal {
            status: Some(401),
            ..Default::default()
        };
        mgr.report_failure(&pid, sel.slot, &sig).await;
        let state = mgr.state_of(&pid, sel.slot).await.unwrap();
        assert!(matches!(state, KeyState::Quarantined { .. }));
    }
}

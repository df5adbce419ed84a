use tokio::time::Instant;

use serde::{Deserialize, Serialize};

/// Index of a key within a profile's ordered `apiKeys` list; the unit the
/// Key Manager tracks health against, per profile.
pub type KeySlot = usize;

/// State machine: `Healthy -> Cooling -> Healthy` and
/// `Healthy -> Quarantined`. Quarantined is modeled as a long cooldown
/// rather than a fourth terminal state: quarantine is a soft state, and
/// after its 24h cooldown the key re-enters Healthy.
#[derive(Debug, Clone, Copy)]
pub enum KeyState {
    Healthy,
    Cooling { until: Instant, reason: UnavailableReason },
    Quarantined { until: Instant },
}

impl KeyState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, KeyState::Healthy)
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        match self {
            KeyState::Healthy => None,
            KeyState::Cooling { until, .. } | KeyState::Quarantined { until } => Some(*until),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.cooldown_until().is_none_or(|until| until <= now)
    }
}

/// Why a key entered cooldown or quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    /// 401/403 or an `invalid_api_key` body signal.
    AuthInvalid,
    /// 429, a `rate_limit` body signal, or a `Retry-After` header.
    RateLimit,
    /// 5xx, network error, timeout, or a non-caller abort.
    Transient,
}

/// Per-(profile, key) bookkeeping record. Created lazily on first selection,
/// reset on success, incremented on failure; never evicted except when the
/// profile itself is deleted.
#[derive(Debug, Clone)]
pub struct KeyHealth {
    pub usage_counter: u64,
    pub consecutive_failures: u32,
    pub state: KeyState,
}

impl Default for KeyHealth {
    fn default() -> Self {
        Self {
            usage_counter: 0,
            consecutive_failures: 0,
            state: KeyState::Healthy,
        }
    }
}

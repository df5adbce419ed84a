use std::time::Duration;

use crate::state::UnavailableReason;

/// Input to failure classification: whatever the Dispatcher observed about
/// a failed upstream call.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal {
    pub status: Option<u16>,
    pub body_signal: Option<BodySignal>,
    pub retry_after: Option<Duration>,
    pub is_network_error: bool,
    pub is_timeout: bool,
    pub is_user_abort: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySignal {
    InvalidApiKey,
    RateLimit,
}

/// Outcome of classifying a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Permanent,
    RateLimit,
    Transient,
    /// The caller's own abort signal fired; never penalizes the key.
    UserAbort,
}

impl FailureSignal {
    pub fn classify(&self) -> FailureClass {
        if self.is_user_abort {
            return FailureClass::UserAbort;
        }
        if matches!(self.status, Some(401) | Some(403))
            || self.body_signal == Some(BodySignal::InvalidApiKey)
        {
            return FailureClass::Permanent;
        }
        if self.status == Some(429)
            || self.body_signal == Some(BodySignal::RateLimit)
            || self.retry_after.is_some()
        {
            return FailureClass::RateLimit;
        }
        FailureClass::Transient
    }
}

impl FailureClass {
    pub fn unavailable_reason(self) -> Option<UnavailableReason> {
        match self {
            FailureClass::Permanent => Some(UnavailableReason::AuthInvalid),
            FailureClass::RateLimit => Some(UnavailableReason::RateLimit),
            FailureClass::Transient => Some(UnavailableReason::Transient),
            FailureClass::UserAbort => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_401_as_permanent() {
        let sig = FailureSignal {
            status: Some(401),
            ..Default::default()
        };
        assert_eq!(sig.classify(), FailureClass::Permanent);
    }

    #[test]
    fn classifies_429_with_retry_after_as_rate_limit() {
        let sig = FailureSignal {
            status: Some(429),
            retry_after: Some(Duration::from_secs(7)),
            ..Default::default()
        };
        assert_eq!(sig.classify(), FailureClass::RateLimit);
    }

    #[test]
    fn classifies_5xx_as_transient() {
        let sig = FailureSignal {
            status: Some(503),
            ..Default::default()
        };
        assert_eq!(sig.classify(), FailureClass::Transient);
    }

    #[test]
    fn user_abort_overrides_any_status() {
        let sig = FailureSignal {
            status: Some(500),
            is_user_abort: true,
            ..Default::default()
        };
        assert_eq!(sig.classify(), FailureClass::UserAbort);
    }
}

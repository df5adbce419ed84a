//! Shared identifiers and small value types used by every other crate in the
//! dispatch core. Kept dependency-free (besides `serde`/`time`/`uuid`) so it
//! sits at the bottom of the workspace's dependency graph.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Stable identifier of a configured provider profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProfileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProfileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The vendor wire-format family a profile talks to.
///
/// The vendor wire-format family a profile speaks: one of six supported kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAI,
    OpenAIResponses,
    Claude,
    Gemini,
    Vertex,
    Cohere,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::OpenAIResponses => "openai_responses",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Vertex => "vertex",
            ProviderKind::Cohere => "cohere",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a profile's configured type string does not match any
/// of the six known kinds. The Dispatcher treats this as "fall back to
/// OpenAI-compatible, rather than a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownProviderKind;

impl fmt::Display for UnknownProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider kind")
    }
}

impl std::error::Error for UnknownProviderKind {}

impl FromStr for ProviderKind {
    type Err = UnknownProviderKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Ok(ProviderKind::OpenAI),
            "openai_responses" | "openai-responses" | "responses" => {
                Ok(ProviderKind::OpenAIResponses)
            }
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "vertex" | "vertex-ai" | "vertex_ai" => Ok(ProviderKind::Vertex),
            "cohere" => Ok(ProviderKind::Cohere),
            _ => Err(UnknownProviderKind),
        }
    }
}

/// Monotonic id generator for records that must never repeat or go backward
/// within one process: request ids are monotonic
/// and never reused").
#[derive(Debug, Default)]
pub struct MonotonicIdGen(AtomicU64);

impl MonotonicIdGen {
    pub const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_common_aliases() {
        assert_eq!(ProviderKind::from_str("Anthropic").unwrap(), ProviderKind::Claude);
        assert_eq!(ProviderKind::from_str("vertex-ai").unwrap(), ProviderKind::Vertex);
        assert!(ProviderKind::from_str("mystery").is_err());
    }

    #[test]
    fn monotonic_id_gen_never_repeats() {
        let gen = MonotonicIdGen::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }
}

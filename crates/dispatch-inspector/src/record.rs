use std::collections::BTreeMap;

use time::OffsetDateTime;

/// The pre-call half of an inspection record: everything known before the
/// upstream has answered.
#[derive(Debug, Clone)]
pub struct InspectorRequestRecord {
    pub id: u64,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub size: usize,
    pub timestamp: OffsetDateTime,
}

/// The post-call half, linked to its request by `id`. Absent for a request
/// that is still in flight or whose response arrived as a stream (see
/// `InspectorEvent::StreamUpdate` instead).
#[derive(Debug, Clone)]
pub struct InspectorResponseRecord {
    pub id: u64,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub size: usize,
    pub duration_ms: u64,
    pub timestamp: OffsetDateTime,
}

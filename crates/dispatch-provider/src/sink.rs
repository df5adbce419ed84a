/// Destination for streamed text, invoked synchronously and in order from
/// within the SSE parsing loop: chunk callbacks fire in
/// network-arrival order and never interleave with each other.
/// Mirrors the caller-supplied `onStream`/`onReasoningStream` closures.
pub trait StreamSink: Send + Sync {
    fn on_text(&self, chunk: &str);
    fn on_reasoning(&self, chunk: &str);
}

/// A sink that discards everything; used by non-streaming callers and in
/// tests that only care about the final normalized response.
pub struct NullSink;

impl StreamSink for NullSink {
    fn on_text(&self, _chunk: &str) {}
    fn on_reasoning(&self, _chunk: &str) {}
}

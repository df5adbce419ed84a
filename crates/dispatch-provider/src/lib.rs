//! Provider adapters: one `ChatAdapter` implementation per wire protocol,
//! translating between the normalized request/response model
//! (`dispatch-transform`) and each vendor's HTTP surface.

pub mod adapter;
pub mod claude;
pub mod cohere;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod openai_responses;
pub mod sink;
pub mod transport;
pub mod url;
pub mod vertex;
mod util;

pub use adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
pub use claude::ClaudeAdapter;
pub use cohere::CohereAdapter;
pub use error::TransportError;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use openai_responses::OpenAiResponsesAdapter;
pub use sink::{NullSink, StreamSink};
pub use transport::{ProxyConfig, Transport, TransportConfig};
pub use url::{VertexOperation, VertexPublisher};
pub use vertex::VertexAdapter;

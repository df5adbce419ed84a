pub mod content;
pub mod finish_reason;
pub mod model;
pub mod params;
pub mod reserved;

pub use content::{infer_image_mime, parse_message_contents, GroupedParts};
pub use params::{extract_common_parameters, extract_tool_definitions, parse_tool_choice};
pub use reserved::{apply_custom_parameters, clean_payload, INTERNAL_ONLY_KEYS, RESERVED_KEYS};

use crate::model::ContentPart;

/// Output of `parse_message_contents`: one message's parts grouped by kind,
/// the shape every adapter's block-building code iterates over.
#[derive(Debug, Clone, Default)]
pub struct GroupedParts<'a> {
    pub text: Vec<&'a ContentPart>,
    pub image: Vec<&'a ContentPart>,
    pub tool_use: Vec<&'a ContentPart>,
    pub tool_result: Vec<&'a ContentPart>,
    pub document: Vec<&'a ContentPart>,
    pub audio: Vec<&'a ContentPart>,
    pub video: Vec<&'a ContentPart>,
}

pub fn parse_message_contents(parts: &[ContentPart]) -> GroupedParts<'_> {
    let mut grouped = GroupedParts::default();
    for part in parts {
        match part {
            ContentPart::Text { .. } => grouped.text.push(part),
            ContentPart::Image { .. } => grouped.image.push(part),
            ContentPart::ToolUse { .. } => grouped.tool_use.push(part),
            ContentPart::ToolResult { .. } => grouped.tool_result.push(part),
            ContentPart::Document { .. } => grouped.document.push(part),
            ContentPart::Audio { .. } => grouped.audio.push(part),
            ContentPart::Video { .. } => grouped.video.push(part),
        }
    }
    grouped
}

/// Infers an image MIME type from a filename extension, falling back to the
/// base64 payload's magic-byte prefix, falling back to `image/png`.
pub fn infer_image_mime(filename: Option<&str>, base64_data: &str) -> &'static str {
    if let Some(name) = filename {
        if let Some(ext) = name.rsplit('.').next() {
            match ext.to_ascii_lowercase().as_str() {
                "png" => return "image/png",
                "jpg" | "jpeg" => return "image/jpeg",
                "gif" => return "image/gif",
                "webp" => return "image/webp",
                _ => {}
            }
        }
    }
    if base64_data.starts_with("iVBOR") {
        "image/png"
    } else if base64_data.starts_with("/9j/") {
        "image/jpeg"
    } else if base64_data.starts_with("R0lGO") {
        "image/gif"
    } else if base64_data.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CacheControl;

    fn text(s: &str) -> ContentPart {
        ContentPart::Text {
            text: s.to_string(),
            cache_control: None::<CacheControl>,
        }
    }

    #[test]
    fn groups_parts_by_kind() {
        let parts = vec![
            text("hello"),
            ContentPart::Image {
                data: "iVBORw0KGgo".to_string(),
                mime: None,
                cache_control: None,
            },
            ContentPart::ToolUse {
                id: "call-1".to_string(),
                name: "calculator".to_string(),
                input: serde_json::json!({"a": 1}),
            },
        ];
        let grouped = parse_message_contents(&parts);
        assert_eq!(grouped.text.len(), 1);
        assert_eq!(grouped.image.len(), 1);
        assert_eq!(grouped.tool_use.len(), 1);
        assert!(grouped.tool_result.is_empty());
    }

    #[test]
    fn infers_mime_by_extension_then_magic_prefix() {
        assert_eq!(infer_image_mime(Some("photo.JPG"), ""), "image/jpeg");
        assert_eq!(infer_image_mime(None, "iVBORw0KGgoAAAA"), "image/png");
        assert_eq!(infer_image_mime(None, "/9j/4AAQSkZJRg"), "image/jpeg");
        assert_eq!(infer_image_mime(None, "R0lGODlhAQABAIAAAAAAAP"), "image/gif");
        assert_eq!(infer_image_mime(None, "UklGRiIAAABXRUJQVlA4"), "image/webp");
        assert_eq!(infer_image_mime(None, "not-recognized"), "image/png");
    }
}

//! Attachments: inline or referenced binary payloads keyed by a stable
//! placeholder name.

use serde::{Deserialize, Serialize};

/// Where an attachment originated. Left open-ended since the set of
/// producers (user uploads, image-generation tools, ...) is defined by
/// the tool registry, which is out of scope (§1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Uploaded directly by the end user.
    UserUpload,
    /// Produced by an image-generation tool.
    Seedream,
    /// Any other producer, named verbatim.
    Other(String),
}

/// An attachment registered under a placeholder name, unique per
/// `TaskState` (§3).
///
/// Invariant: at most one of `{inline_data, uri}` need be present; when
/// both exist `uri` is authoritative for persistence and `inline_data`
/// is transient. A registered attachment is immutable once its
/// iteration index is assigned (tracked separately in
/// `TaskState::attachment_origin_iteration`); re-registration under the
/// same placeholder is allowed only if the new value is equal to the
/// existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Placeholder name, e.g. `image_1`. Unique within its `TaskState`.
    pub placeholder: String,
    /// Human-readable display name.
    pub display_name: String,
    /// MIME type.
    pub media_type: String,
    /// Base64-encoded inline payload, if resolved inline.
    pub inline_data: Option<String>,
    /// URI reference, if persisted externally. Authoritative over
    /// `inline_data` when both are present.
    pub uri: Option<String>,
    /// Free-text description, if the producer supplied one.
    pub description: Option<String>,
    /// Producer tag.
    pub source: AttachmentSource,
}

impl Attachment {
    /// The reference a final answer or tool argument should use:
    /// `uri` if present, otherwise a data URI built from `inline_data`.
    pub fn canonical_reference(&self) -> Option<String> {
        if let Some(uri) = &self.uri {
            return Some(uri.clone());
        }
        self.inline_data
            .as_ref()
            .map(|data| format!("data:{};base64,{}", self.media_type, data))
    }

    /// Whether `other` is value-equal to `self` for the purposes of the
    /// re-registration invariant (ignores nothing — every field must
    /// match).
    pub fn value_equal(&self, other: &Attachment) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attachment {
        Attachment {
            placeholder: "image_1".into(),
            display_name: "image_1.png".into(),
            media_type: "image/png".into(),
            inline_data: Some("QUJD".into()),
            uri: None,
            description: None,
            source: AttachmentSource::UserUpload,
        }
    }

    #[test]
    fn uri_is_authoritative_over_inline_data() {
        let mut a = sample();
        a.uri = Some("https://cdn.example/a.png".into());
        assert_eq!(a.canonical_reference().as_deref(), Some("https://cdn.example/a.png"));
    }

    #[test]
    fn inline_data_used_when_no_uri() {
        let a = sample();
        let reference = a.canonical_reference().unwrap();
        assert!(reference.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn reregistration_requires_value_equality() {
        let a = sample();
        let mut b = sample();
        assert!(a.value_equal(&b));
        b.display_name = "renamed.png".into();
        assert!(!a.value_equal(&b));
    }
}

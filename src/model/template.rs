//! The message template a run personalizes.

/// A file carried by the draft, either a regular attachment or an inline
/// resource referenced from the HTML body by Content-ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAttachment {
    /// MIME content type (e.g. `"image/png"`, `"application/pdf"`).
    pub mime_type: String,

    /// Filename shown to the recipient. May be empty for inline parts.
    pub filename: String,

    /// Decoded binary payload.
    pub bytes: Vec<u8>,

    /// Content-ID without angle brackets, if the draft declared one.
    pub content_id: Option<String>,
}

impl TemplateAttachment {
    /// Inline resources are images that the body references by Content-ID.
    pub fn is_inline(&self) -> bool {
        self.mime_type.starts_with("image/") && self.content_id.is_some()
    }
}

/// Subject, HTML body and attachments, loaded once per run and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<TemplateAttachment>,
}

impl Template {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Total payload size of all attachments in bytes.
    pub fn attachments_size(&self) -> u64 {
        self.attachments.iter().map(|a| a.bytes.len() as u64).sum()
    }
}

//! Draft retrieval: where a run gets its [`Template`] from.

use std::path::{Path, PathBuf};

use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::model::template::{Template, TemplateAttachment};

/// Subject used when the draft has none.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Supplies the template for a draft identifier. Called once per run.
pub trait TemplateSource {
    fn fetch(&self, draft_id: &str) -> Result<Template>;
}

/// A fixed template, whatever the identifier.
impl TemplateSource for Template {
    fn fetch(&self, _draft_id: &str) -> Result<Template> {
        Ok(self.clone())
    }
}

/// Short description of a draft for listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DraftSummary {
    pub id: String,
    pub subject: String,
    pub attachments: usize,
}

/// Drafts stored as `.eml` files in a directory.
///
/// The draft id is the file stem (`welcome` for `welcome.eml`). An id that
/// names an existing file is used as a path directly.
#[derive(Debug, Clone)]
pub struct EmlDrafts {
    dir: PathBuf,
}

impl EmlDrafts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, draft_id: &str) -> PathBuf {
        let direct = Path::new(draft_id);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        self.dir.join(format!("{draft_id}.eml"))
    }

    /// List every `.eml` draft in the directory, sorted by id.
    pub fn list(&self) -> Result<Vec<DraftSummary>> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| MergeError::open(&self.dir, e))?;
        let mut drafts = Vec::new();
        for entry in read_dir {
            let path = entry.map_err(|e| MergeError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("eml") {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.fetch(&id) {
                Ok(template) => drafts.push(DraftSummary {
                    id,
                    subject: template.subject,
                    attachments: template.attachments.len(),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable draft"),
            }
        }
        drafts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(drafts)
    }
}

impl TemplateSource for EmlDrafts {
    fn fetch(&self, draft_id: &str) -> Result<Template> {
        let path = self.path_for(draft_id);
        debug!(path = %path.display(), "Loading draft");
        let data = std::fs::read(&path).map_err(|e| MergeError::open(&path, e))?;
        parse_draft(draft_id, &data)
    }
}

/// Parse a raw RFC 5322 draft into a template.
///
/// The body is the HTML part; a text-only draft is rendered as HTML. Every
/// non-body part becomes an attachment, keeping its Content-ID.
pub fn parse_draft(draft_id: &str, raw: &[u8]) -> Result<Template> {
    let raw = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);
    let msg = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MergeError::Draft {
            id: draft_id.to_string(),
            reason: "not a valid RFC 5322 message".into(),
        })?;

    let subject = msg
        .subject()
        .map(String::from)
        .unwrap_or_else(|| NO_SUBJECT.to_string());
    let body = msg
        .body_html(0)
        .map(|s| s.into_owned())
        .unwrap_or_default();

    let attachments = msg
        .attachments()
        .map(|part| {
            let mime_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string())
                .to_ascii_lowercase();
            TemplateAttachment {
                mime_type,
                filename: part.attachment_name().unwrap_or_default().to_string(),
                bytes: part.contents().to_vec(),
                content_id: part
                    .content_id()
                    .map(|cid| cid.trim_matches(|c| c == '<' || c == '>').to_string()),
            }
        })
        .collect();

    Ok(Template {
        subject,
        body,
        attachments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT: &str = "From: me@example.com\r\n\
Subject: Hello {{Name}}\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Dear {{Name}}</p>\r\n\
--XX\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"terms.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8=\r\n\
--XX\r\n\
Content-Type: image/png\r\n\
Content-ID: <logo@example>\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0K\r\n\
--XX--\r\n";

    #[test]
    fn test_parse_draft() {
        let template = parse_draft("d1", DRAFT.as_bytes()).unwrap();
        assert_eq!(template.subject, "Hello {{Name}}");
        assert!(template.body.contains("Dear {{Name}}"));
        assert_eq!(template.attachments.len(), 2);

        let pdf = &template.attachments[0];
        assert_eq!(pdf.mime_type, "application/pdf");
        assert_eq!(pdf.filename, "terms.pdf");
        assert_eq!(pdf.bytes, b"Hello");
        assert!(!pdf.is_inline());

        let logo = &template.attachments[1];
        assert_eq!(logo.content_id.as_deref(), Some("logo@example"));
        assert!(logo.is_inline());
    }

    #[test]
    fn test_missing_subject_defaults() {
        let template = parse_draft("d2", b"From: me@example.com\r\n\r\nJust text\r\n").unwrap();
        assert_eq!(template.subject, NO_SUBJECT);
        assert!(template.body.contains("Just text"));
        assert!(template.attachments.is_empty());
    }

    #[test]
    fn test_fetch_and_list_drafts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("welcome.eml"), DRAFT).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let drafts = EmlDrafts::new(dir.path());
        let template = drafts.fetch("welcome").unwrap();
        assert_eq!(template.subject, "Hello {{Name}}");

        let listed = drafts.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "welcome");
        assert_eq!(listed[0].attachments, 2);

        assert!(matches!(
            drafts.fetch("missing"),
            Err(MergeError::FileNotFound(_))
        ));
    }
}

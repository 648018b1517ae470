//! Message composition and delivery.
//!
//! The dispatcher hands every transport an [`OutgoingMessage`]. Transports
//! render it with [`compose`] into a `multipart/related` MIME message:
//!
//! ```text
//! multipart/related
//! ├── multipart/alternative
//! │   └── text/html            (personalized body)
//! ├── image/*                  (inline, Content-ID kept)
//! └── application/...          (regular attachments)
//! ```

pub mod outbox;
pub mod smtp;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::Message;

use crate::error::TransportError;
use crate::model::template::TemplateAttachment;

pub use outbox::OutboxTransport;
pub use smtp::{SmtpConfig, SmtpSender};

/// The sender identity placed in the `From` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Sender {
    pub display_name: String,
    pub email: String,
}

/// A fully personalized message for one row.
#[derive(Debug, Clone)]
pub struct OutgoingMessage<'a> {
    pub from: &'a Sender,
    pub to: String,
    /// Comma-separated, may be empty.
    pub cc: String,
    /// Comma-separated, may be empty.
    pub bcc: String,
    pub subject: String,
    pub html_body: String,
    /// Attachments included for this row; empty if withheld.
    pub attachments: &'a [TemplateAttachment],
}

/// Delivers composed messages. Any error is recorded on the row and the run
/// continues.
pub trait Transport: Send {
    fn name(&self) -> &'static str;

    fn send(&mut self, message: &OutgoingMessage<'_>) -> Result<(), TransportError>;
}

/// Whether the rendered message keeps its `Bcc` header.
///
/// Delivery transports must drop it; archival ones keep it so the record is
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BccHeader {
    Keep,
    Drop,
}

/// Render an [`OutgoingMessage`] as a MIME message.
pub fn compose(message: &OutgoingMessage<'_>, bcc_header: BccHeader) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(sender_mailbox(message.from)?)
        .subject(message.subject.clone());

    builder = builder.to(message
        .to
        .parse::<Mailbox>()
        .map_err(|e| TransportError::Compose(format!("invalid recipient '{}': {e}", message.to)))?);
    for mailbox in parse_list(&message.cc, "cc")? {
        builder = builder.cc(mailbox);
    }
    for mailbox in parse_list(&message.bcc, "bcc")? {
        builder = builder.bcc(mailbox);
    }
    if bcc_header == BccHeader::Keep {
        builder = builder.keep_bcc();
    }

    let alternative = MultiPart::alternative().singlepart(SinglePart::html(message.html_body.clone()));
    let mut related = MultiPart::related().multipart(alternative);
    for attachment in message.attachments {
        related = related.singlepart(attachment_part(attachment)?);
    }

    builder
        .multipart(related)
        .map_err(|e| TransportError::Compose(e.to_string()))
}

fn sender_mailbox(sender: &Sender) -> Result<Mailbox, TransportError> {
    let address = sender
        .email
        .trim()
        .parse()
        .map_err(|e| TransportError::Compose(format!("invalid sender '{}': {e}", sender.email)))?;
    let name = sender.display_name.trim();
    Ok(Mailbox::new((!name.is_empty()).then(|| name.to_string()), address))
}

fn parse_list(list: &str, field: &str) -> Result<Vec<Mailbox>, TransportError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mailboxes: Mailboxes = list
        .parse()
        .map_err(|e| TransportError::Compose(format!("invalid {field} list '{list}': {e}")))?;
    Ok(mailboxes.into_iter().collect())
}

fn attachment_part(attachment: &TemplateAttachment) -> Result<SinglePart, TransportError> {
    let content_type = ContentType::parse(&attachment.mime_type).map_err(|e| {
        TransportError::Compose(format!(
            "invalid content type '{}' for '{}': {e}",
            attachment.mime_type, attachment.filename
        ))
    })?;
    let builder = match (&attachment.content_id, attachment.is_inline()) {
        (Some(cid), true) => Attachment::new_inline(cid.clone()),
        _ => Attachment::new(attachment.filename.clone()),
    };
    Ok(builder.body(attachment.bytes.clone(), content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender {
            display_name: "Team".into(),
            email: "team@example.com".into(),
        }
    }

    fn message<'a>(from: &'a Sender, attachments: &'a [TemplateAttachment]) -> OutgoingMessage<'a> {
        OutgoingMessage {
            from,
            to: "bob@example.com".into(),
            cc: "a@example.com, b@example.com".into(),
            bcc: "hidden@example.com".into(),
            subject: "Hello Bob".into(),
            html_body: "<p>Dear Bob</p>".into(),
            attachments,
        }
    }

    fn render(msg: &OutgoingMessage<'_>, bcc: BccHeader) -> String {
        String::from_utf8(compose(msg, bcc).unwrap().formatted()).unwrap()
    }

    #[test]
    fn test_headers() {
        let from = sender();
        let text = render(&message(&from, &[]), BccHeader::Drop);
        assert!(text.contains("From: Team <team@example.com>"));
        assert!(text.contains("To: bob@example.com"));
        assert!(text.contains("a@example.com"));
        assert!(text.contains("b@example.com"));
        assert!(text.contains("Subject: Hello Bob"));
        assert!(text.contains("multipart/related"));
        assert!(text.contains("multipart/alternative"));
        assert!(!text.contains("hidden@example.com"));
    }

    #[test]
    fn test_keep_bcc() {
        let from = sender();
        let text = render(&message(&from, &[]), BccHeader::Keep);
        assert!(text.contains("hidden@example.com"));
    }

    #[test]
    fn test_inline_and_regular_attachments() {
        let from = sender();
        let attachments = vec![
            TemplateAttachment {
                mime_type: "image/png".into(),
                filename: "logo.png".into(),
                bytes: vec![1, 2, 3],
                content_id: Some("logo@x".into()),
            },
            TemplateAttachment {
                mime_type: "application/pdf".into(),
                filename: "terms.pdf".into(),
                bytes: b"%PDF".to_vec(),
                content_id: None,
            },
        ];
        let text = render(&message(&from, &attachments), BccHeader::Drop);
        assert!(text.contains("Content-ID: <logo@x>"));
        assert!(text.contains("inline"));
        assert!(text.contains("terms.pdf"));
    }

    #[test]
    fn test_invalid_recipient_is_compose_error() {
        let from = sender();
        let mut msg = message(&from, &[]);
        msg.to = "not an address".into();
        assert!(matches!(
            compose(&msg, BccHeader::Drop),
            Err(TransportError::Compose(_))
        ));
    }
}

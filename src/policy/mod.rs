//! Per-row envelope policies: who receives the message and whether the
//! draft's attachments go with it.

pub mod attachments;
pub mod recipients;

pub use attachments::{AttachmentDecision, AttachmentMode, AttachmentPolicy, EmptyCellDefault};
pub use recipients::{RecipientMode, RecipientSet, RecipientSettings};

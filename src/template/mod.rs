//! Templates: draft retrieval, placeholder resolution and preview rendering.

pub mod draft;
pub mod html;
pub mod resolve;

pub use draft::{EmlDrafts, TemplateSource};
pub use resolve::{resolve, resolve_tag_stripped, Placeholders};

//! Core data model: templates, rows, and row outcomes.

pub mod outcome;
pub mod row;
pub mod template;

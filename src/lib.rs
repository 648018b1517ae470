//! `mailmerge`: personalized batch email from a recipient list and a draft.
//!
//! This crate provides the core library: placeholder resolution, per-row
//! recipient and attachment policies, and a checkpointed dispatcher that can
//! be stopped and resumed without losing track of which rows were sent.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod policy;
pub mod store;
pub mod template;
pub mod transport;

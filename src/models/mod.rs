//! Data models for the Help Scout APIs.
//!
//! This module contains the normalized listing page, Docs directory entities
//! (sites, collections, articles) and the conversation/mailbox summaries
//! returned by tools.

mod common;
mod docs;
mod mailbox;

pub use common::*;
pub use docs::*;
pub use mailbox::*;

//! Domain models for Agile Planner.
//!
//! # Core Concepts
//!
//! ## Input
//!
//! - [`Backlog`]: The full project plan handed over by the generation collaborator.
//!   Epics own features, features own user stories.
//! - [`StoryRef`]: A reference from the MVP selection or an iteration to a story,
//!   optionally carrying inline fields for stories no feature owns (orphans).
//!
//! ## Output
//!
//! - [`BacklogIndex`]: Manifest of every materialized document and its orphan status.

mod backlog;
mod index;

pub use backlog::*;
pub use index::*;

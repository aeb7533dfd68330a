//! The Skill Engine (C4): loads, validates, and version-selects
//! date-effective rule packs for a given tax year.
//!
//! Skill payloads stay opaque key-value maps ([`orbit_core::SkillContent`])
//! because their schema is domain-defined and evolves with tax law; this
//! crate only owns the YAML document shape, validation, and selection.

/// YAML document parsing, validation, and round-trip dumping.
pub mod document;
/// The selection engine built on top of a [`orbit_store::SkillStore`].
pub mod engine;

pub use document::ValidationError;
pub use engine::SkillEngine;

//! URL handling module for Image-Harvest
//!
//! This module resolves extracted attribute values against a stage's base
//! prefix and derives the [`ResourceKey`] used for de-duplication and file
//! naming.

mod key;
mod resolve;

// Re-export main functions
pub use key::{resource_key, ResourceKey};
pub use resolve::{resolve_href, stage_base};

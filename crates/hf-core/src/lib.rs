//! hf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other hf-* crates,
//! providing type-safe identifiers, a unified error type, the source and
//! encode contracts shared by the engines and the packager, application
//! configuration, and a broadcast event bus.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use engine::{EncodeEngine, MetadataInspector, NoThumbnails, ThumbnailRequester};
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;

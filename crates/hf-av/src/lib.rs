//! # hf-av
//!
//! External engine backends for the hlsforge packager.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support and line-by-line stderr streaming.
//! - **Metadata inspection** ([`FfprobeInspector`]) -- implements
//!   [`hf_core::MetadataInspector`] by shelling out to ffprobe.
//! - **Rendition encoding** ([`FfmpegEngine`]) -- implements
//!   [`hf_core::EncodeEngine`] with software and hardware-accelerated
//!   ffmpeg invocations and `-progress` parsing.
//! - **Thumbnails** ([`extract_thumbnail`]) -- grab a single scaled frame.

pub mod command;
pub mod encode;
pub mod probe;
pub mod thumbnail;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use encode::{FfmpegEngine, ProgressParser};
pub use probe::FfprobeInspector;
pub use thumbnail::extract_thumbnail;
pub use tools::{ToolInfo, ToolRegistry};

//! Route handlers for the HTTP API.

pub mod jobs;
pub mod status;
pub mod videos;

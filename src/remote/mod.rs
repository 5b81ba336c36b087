//! Backend collaborator: endpoint map, HTTP client and wire types.

pub mod api_types;
mod client;
mod endpoint;

pub use client::{Backend, HttpBackend};
pub use endpoint::Endpoint;

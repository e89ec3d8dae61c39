//! Project/website metadata registry: opaque metadata storage
//! keyed by slug, plus deterministic storage-path resolution. Treated by the
//! rest of the core as an external collaborator, not part of the
//! fetch/snapshot/version/score/diff pipeline.

pub mod error;
mod registry;
pub mod storage;
pub mod types;

pub use error::{RegistryError, Result};
pub use registry::Registry;
pub use types::{Project, Website};

//! Repository traits for metadata operations.

pub mod hashes;
pub mod sessions;

pub use hashes::HashIndex;
pub use sessions::SessionStore;

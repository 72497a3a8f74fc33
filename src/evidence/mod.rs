//! Evidence composition, hashing, and archival

pub mod archive;
pub mod composer;
pub mod hash;

pub use archive::EvidenceArchive;
pub use composer::{compose, EvidenceDocument};
pub use hash::{is_sha256_hex, sha256_hex};

//! syncspace-model - shared types for the SyncSpace backend
//!
//! Strong byte-array types used for identifiers and signatures, plus the
//! centralized crypto module every other crate signs and hashes through.

pub mod clock;
pub mod crypto;
pub mod types;

pub use crypto::CryptoError;
pub use types::{ChangeId, DocumentId, Hash, PubKey, Signature, SpaceId};

//! syncspace-core - spaces and documents
//!
//! The two stateful engines behind the command surface:
//! - `SpaceManager`: space lifecycle, per-space embedded databases, and the
//!   `spaces_metadata.json` sidecar
//! - `DocumentEngine`: per-document DAGs of signed changes with head
//!   tracking, plus the per-space document metadata sidecar

pub mod change;
pub mod document_engine;
pub mod sidecar;
pub mod space_manager;

pub use change::{build_signed_change, decode_change, verify_signed_change, ChangeError};
pub use document_engine::{DocumentContent, DocumentEngine, DocumentError, DocumentMetadata};
pub use space_manager::{SpaceError, SpaceManager, SpaceMetadata};

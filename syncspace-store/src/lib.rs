//! syncspace-store - embedded per-space database
//!
//! Wraps a `redb` database file with named collections of JSON documents.
//! Every document carries a string `id`; collections can additionally declare
//! one indexed field for key-range lookups without full scans.

mod space_db;

pub use space_db::{Collection, SpaceDb, StoreError};

//! syncspace-identity - account and device keys
//!
//! Each installation holds two Ed25519 key pairs:
//! - Account key: the long-lived identity, stored in `account.key`
//! - Device key: this installation, stored in `device.key` sealed under a
//!   key derived from the account key
//!
//! Once created, the keys never change for the lifetime of the data
//! directory. The device key is sealed now so a later account-relock feature
//! does not need a schema break.

mod account;

pub use account::{AccountKeys, AccountManager, IdentityError};

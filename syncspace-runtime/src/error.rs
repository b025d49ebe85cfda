//! CommandError - the machine-comparable error kinds of the command surface
//!
//! Handlers translate component errors into exactly one of these kinds; the
//! transport maps them onto RPC status codes without further interpretation.

use syncspace_core::{DocumentError, SpaceError};
use syncspace_events::EventBusError;
use syncspace_identity::IdentityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("not initialized: call Init first")]
    NotInitialized,

    #[error("already initialized with a different data directory")]
    AlreadyInitialized,

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt key material: {0}")]
    CorruptKey(String),

    #[error("key files missing: {0}")]
    KeysMissing(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("not implemented: {0}")]
    Unimplemented(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Stable kind string for logs and transport metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::BadRequest(_) => "bad_request",
            CommandError::NotFound(_) => "not_found",
            CommandError::UnknownCommand(_) => "unknown_command",
            CommandError::NotInitialized => "not_initialized",
            CommandError::AlreadyInitialized => "already_initialized",
            CommandError::Io(_) => "io",
            CommandError::CorruptKey(_) => "corrupt_key",
            CommandError::KeysMissing(_) => "keys_missing",
            CommandError::Crypto(_) => "crypto",
            CommandError::Unimplemented(_) => "unimplemented",
            CommandError::Encoding(_) => "encoding",
            CommandError::Internal(_) => "internal",
        }
    }
}

impl From<IdentityError> for CommandError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::KeysMissing(dir) => {
                CommandError::KeysMissing(dir.display().to_string())
            }
            IdentityError::CorruptKey(msg) => CommandError::CorruptKey(msg),
            IdentityError::Io(e) => CommandError::Io(e.to_string()),
            IdentityError::Crypto(e) => CommandError::Crypto(e.to_string()),
            IdentityError::NoKeys => CommandError::Internal("no keys loaded".to_string()),
        }
    }
}

impl From<SpaceError> for CommandError {
    fn from(e: SpaceError) -> Self {
        match e {
            SpaceError::NotFound(id) => CommandError::NotFound(format!("space {}", id)),
            SpaceError::Io(e) => CommandError::Io(e.to_string()),
            // Embedded-DB faults surface as the IO kind.
            SpaceError::Store(e) => CommandError::Io(e.to_string()),
            SpaceError::Crypto(e) => CommandError::Crypto(e.to_string()),
        }
    }
}

impl From<DocumentError> for CommandError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Space(e) => e.into(),
            DocumentError::NotFound(id) => CommandError::NotFound(format!("document {}", id)),
            DocumentError::Store(e) => CommandError::Io(e.to_string()),
            DocumentError::Change(e) => match e {
                syncspace_core::ChangeError::Signature(e) => CommandError::Crypto(e.to_string()),
                other => CommandError::Internal(other.to_string()),
            },
            DocumentError::Corrupt(msg) => CommandError::Internal(msg),
            DocumentError::Io(e) => CommandError::Io(e.to_string()),
        }
    }
}

impl From<EventBusError> for CommandError {
    fn from(e: EventBusError) -> Self {
        match e {
            EventBusError::NotFound(id) => CommandError::NotFound(format!("subscriber {}", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_not_found_translates() {
        let err: CommandError = SpaceError::NotFound("abc".to_string()).into();
        assert!(matches!(err, CommandError::NotFound(_)));
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_identity_errors_translate() {
        let err: CommandError =
            IdentityError::CorruptKey("device key failed to unseal".to_string()).into();
        assert!(matches!(err, CommandError::CorruptKey(_)));

        let err: CommandError = IdentityError::KeysMissing("/data".into()).into();
        assert!(matches!(err, CommandError::KeysMissing(_)));
    }

    #[test]
    fn test_document_space_error_flattens() {
        let err: CommandError =
            DocumentError::Space(SpaceError::NotFound("abc".to_string())).into();
        assert!(matches!(err, CommandError::NotFound(_)));
    }
}

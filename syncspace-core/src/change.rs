//! Signed change creation and verification
//!
//! A change's canonical encoding is the prost encoding of
//! `storage::Change`; its BLAKE3 hash is the change id, and the account key
//! signs those same bytes. The root change (no parents) hashes to the
//! document id.

use prost::Message;
use syncspace_identity::AccountKeys;
use syncspace_model::{crypto, ChangeId, PubKey, Signature, SpaceId};
use syncspace_proto::storage::{Change, SignedChange};
use thiserror::Error;

/// Change type tag carried by every document change.
pub const CHANGE_TYPE_DOCUMENT: &str = "document";

/// Current change encoding version.
pub const CHANGE_VERSION: u32 = 1;

/// Errors from change encoding and verification.
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("change decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidPublicKeyLength(usize),

    #[error("signature verification failed: {0}")]
    Signature(#[from] syncspace_model::CryptoError),
}

/// Build and sign a change, returning its id and the signed envelope.
pub fn build_signed_change(
    keys: &AccountKeys,
    space_id: &SpaceId,
    parent_ids: &[ChangeId],
    payload: &[u8],
    is_snapshot: bool,
    timestamp: i64,
) -> (ChangeId, SignedChange) {
    let change = Change {
        version: CHANGE_VERSION,
        space_id: space_id.to_hex(),
        parent_ids: parent_ids.iter().map(|p| p.to_hex()).collect(),
        payload: payload.to_vec(),
        change_type: CHANGE_TYPE_DOCUMENT.to_string(),
        is_snapshot,
        timestamp,
        author_device: keys.device_id().as_bytes().to_vec(),
    };

    let change_bytes = change.encode_to_vec();
    let change_id = crypto::content_hash(&change_bytes);
    let signature = keys.sign(&change_bytes);

    let signed = SignedChange {
        change_bytes,
        signature: signature.as_bytes().to_vec(),
        signer: keys.account_id().as_bytes().to_vec(),
    };

    (change_id, signed)
}

/// Decode the change carried by a signed envelope, without verification.
pub fn decode_change(signed: &SignedChange) -> Result<Change, ChangeError> {
    Ok(Change::decode(&signed.change_bytes[..])?)
}

/// Verify the account signature of a signed change and decode it.
pub fn verify_signed_change(signed: &SignedChange) -> Result<Change, ChangeError> {
    let signer = PubKey::try_from(signed.signer.as_slice())
        .map_err(|_| ChangeError::InvalidPublicKeyLength(signed.signer.len()))?;
    let signature = Signature::try_from(signed.signature.as_slice())
        .map_err(|_| ChangeError::InvalidSignatureLength(signed.signature.len()))?;

    crypto::verify(&signer, &signed.change_bytes, &signature)?;
    decode_change(signed)
}

/// Id of a signed change: the content hash of its canonical encoding.
pub fn change_id(signed: &SignedChange) -> ChangeId {
    crypto::content_hash(&signed.change_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncspace_model::Hash;

    fn test_keys() -> AccountKeys {
        let mut mgr = syncspace_identity::AccountManager::new("/tmp/unused");
        mgr.generate();
        mgr.keys().unwrap().clone()
    }

    #[test]
    fn test_root_change_has_no_parents() {
        let keys = test_keys();
        let space = Hash([1u8; 32]);
        let (id, signed) = build_signed_change(&keys, &space, &[], b"hello", false, 1000);

        let change = decode_change(&signed).unwrap();
        assert!(change.parent_ids.is_empty());
        assert_eq!(change.payload, b"hello");
        assert_eq!(id, change_id(&signed));
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = test_keys();
        let space = Hash([1u8; 32]);
        let (_, signed) = build_signed_change(&keys, &space, &[], b"data", false, 1000);

        let change = verify_signed_change(&signed).unwrap();
        assert_eq!(change.author_device, keys.device_id().as_bytes());
    }

    #[test]
    fn test_verify_tampered_fails() {
        let keys = test_keys();
        let space = Hash([1u8; 32]);
        let (_, mut signed) = build_signed_change(&keys, &space, &[], b"data", false, 1000);

        signed.change_bytes[0] ^= 0xff;
        assert!(verify_signed_change(&signed).is_err());
    }

    #[test]
    fn test_verify_wrong_signer_fails() {
        let keys = test_keys();
        let other = test_keys();
        let space = Hash([1u8; 32]);
        let (_, mut signed) = build_signed_change(&keys, &space, &[], b"data", false, 1000);

        signed.signer = other.account_id().as_bytes().to_vec();
        assert!(verify_signed_change(&signed).is_err());
    }

    #[test]
    fn test_child_references_parent() {
        let keys = test_keys();
        let space = Hash([1u8; 32]);
        let (root_id, _) = build_signed_change(&keys, &space, &[], b"v1", false, 1000);
        let (child_id, child) =
            build_signed_change(&keys, &space, &[root_id], b"v2", false, 1001);

        assert_ne!(root_id, child_id);
        let change = decode_change(&child).unwrap();
        assert_eq!(change.parent_ids, vec![root_id.to_hex()]);
    }

    #[test]
    fn test_same_payload_different_timestamp_differs() {
        let keys = test_keys();
        let space = Hash([1u8; 32]);
        let (a, _) = build_signed_change(&keys, &space, &[], b"v1", false, 1000);
        let (b, _) = build_signed_change(&keys, &space, &[], b"v1", false, 1001);
        assert_ne!(a, b);
    }
}

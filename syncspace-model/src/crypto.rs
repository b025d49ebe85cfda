//! Centralized cryptographic operations for SyncSpace.
//!
//! All Ed25519 signing, verification, BLAKE3 hashing, key-wrap sealing, and
//! secret generation go through this module, giving a single audit surface.
//!
//! | Primitive | Algorithm            | Purpose                                  |
//! |-----------|----------------------|------------------------------------------|
//! | Hash      | BLAKE3 (32 B)        | Space/change/document ids, DAG linkage   |
//! | Signature | Ed25519 (64 B)       | Change signing, space-create payloads    |
//! | Sealing   | XChaCha20-Poly1305   | Device key at rest, space read keys      |

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};

use crate::types::{Hash, PubKey, Signature};

/// Length of the XChaCha20 nonce prepended to sealed blobs.
pub const NONCE_LEN: usize = 24;

// ---------------------------------------------------------------------------
// Content hashing (BLAKE3)
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 content hash of arbitrary bytes.
///
/// Used for: change ids, document ids, space ids.
#[inline]
pub fn content_hash(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 keys and signing
// ---------------------------------------------------------------------------

/// Generate a fresh random Ed25519 signing key.
pub fn generate_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng)
}

/// Public key of a signing key as a strong type.
pub fn public_key(key: &ed25519_dalek::SigningKey) -> PubKey {
    PubKey(key.verifying_key().to_bytes())
}

/// Sign a message with an Ed25519 signing key.
pub fn sign(key: &ed25519_dalek::SigningKey, message: &[u8]) -> Signature {
    use ed25519_dalek::Signer;
    Signature(key.sign(message).to_bytes())
}

/// Verify an Ed25519 signature over a message.
pub fn verify(pubkey: &PubKey, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    use ed25519_dalek::Verifier;
    let vk = verifying_key(pubkey)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Deserialize a `PubKey` into an Ed25519 `VerifyingKey`.
///
/// Fails if the 32 bytes are not a valid curve point.
pub fn verifying_key(pubkey: &PubKey) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0).map_err(|_| CryptoError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Key-wrap sealing (XChaCha20-Poly1305)
// ---------------------------------------------------------------------------

/// Derive a 32-byte wrap key from secret material and a domain-separation
/// context string.
pub fn derive_wrap_key(context: &str, secret: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, secret)
}

/// Seal plaintext under a wrap key. Output is `nonce || ciphertext`.
pub fn seal(wrap_key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aead = XChaCha20Poly1305::new(Key::from_slice(wrap_key));
    let nonce = {
        use rand::RngCore;
        let mut n = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut n);
        n
    };
    let ciphertext = aead
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed blob produced by [`seal`].
///
/// Truncated input and AEAD authentication failures both report
/// `CryptoError::OpenFailed`; callers decide whether that means corruption.
pub fn open(wrap_key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::OpenFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let aead = XChaCha20Poly1305::new(Key::from_slice(wrap_key));
    aead.decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::OpenFailed)
}

// ---------------------------------------------------------------------------
// Secret generation (CSPRNG)
// ---------------------------------------------------------------------------

/// Generate 32 bytes of cryptographically secure randomness.
///
/// Used for: space read keys, test key material.
pub fn generate_secret() -> [u8; 32] {
    use rand::RngCore;
    let mut secret = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    secret
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid Ed25519 signature")]
    InvalidSignature,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,

    #[error("sealing failed")]
    SealFailed,

    #[error("opening sealed data failed")]
    OpenFailed,
}

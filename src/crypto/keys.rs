//! ECDSA key management for the blockchain
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve (same as Bitcoin). An address is the
//! uncompressed public key (0x04 prefix, then X and Y) rendered as
//! lowercase hex, so address recovery is a straight parse.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature format")]
    InvalidSignatureFormat,
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key.
    /// The key must decode to exactly 32 bytes.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidPrivateKey);
        }
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the address derived from the public key
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }

    /// Sign a 32-byte digest with the private key, returning a DER
    /// signature as hex
    pub fn sign(&self, digest: &[u8]) -> Result<String, KeyError> {
        sign_digest(&self.secret_key, digest)
    }

    /// Verify a signature against this key pair's public key
    pub fn verify(&self, digest: &[u8], signature: &str) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, digest, signature)
    }
}

/// Convert a public key to an address: the uncompressed serialization
/// (65 bytes, leading 0x04) as lowercase hex
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    hex::encode(public_key.serialize_uncompressed())
}

/// Recover a public key from an address.
/// The address must decode to exactly 65 bytes with a 0x04 prefix.
pub fn address_to_public_key(address: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(address).map_err(|_| KeyError::InvalidPublicKey)?;
    if bytes.len() != 65 || bytes[0] != 0x04 {
        return Err(KeyError::InvalidPublicKey);
    }
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a 32-byte digest with a secret key, returning a DER-encoded
/// signature as hex
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8]) -> Result<String, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(hex::encode(signature.serialize_der()))
}

/// Verify a hex signature over a 32-byte digest against a public key.
/// Accepts DER encoding or the raw 64-byte compact r||s form.
pub fn verify_signature(
    public_key: &PublicKey,
    digest: &[u8],
    signature: &str,
) -> Result<bool, KeyError> {
    let sig_bytes = hex::decode(signature).map_err(|_| KeyError::InvalidSignatureFormat)?;

    let sig = Signature::from_der(&sig_bytes)
        .or_else(|_| Signature::from_compact(&sig_bytes))
        .map_err(|_| KeyError::InvalidSignatureFormat)?;

    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}

//! Cryptographic primitives
//!
//! SHA-256 hashing, secp256k1 key management, and merkle trees.

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{sha256, sha256_hex};
pub use keys::{
    address_to_public_key, public_key_to_address, sign_digest, verify_signature, KeyError, KeyPair,
};
pub use merkle::{build_merkle_root, generate_merkle_proof, verify_inclusion};

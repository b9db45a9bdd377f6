// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 key pairs and signatures used to sign tickets, messages and identity claims.
use std::fmt;
use std::hash::Hash as StdHash;
use std::str::FromStr;

use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, Signer, SigningKey, Verifier,
    VerifyingKey,
};
use rand::rngs::OsRng;
use thiserror::Error;

/// Private Ed25519 key used for signing.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the systems random number generator (CSPRNG) as a seed.
    pub fn new() -> Self {
        let mut csprng: OsRng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    /// Create a `PrivateKey` from its raw bytes representation.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    /// Bytes of the private key.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Returns the public key derived from this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign the provided bytes.
    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let value_len = value.len();
        let checked_value: [u8; SECRET_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value_len, SECRET_KEY_LENGTH))?;
        Ok(Self::from_bytes(&checked_value))
    }
}

impl FromStr for PrivateKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex::decode(value)?.as_slice())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material.
        f.debug_tuple("PrivateKey")
            .field(&self.public_key().to_hex())
            .finish()
    }
}

/// Public Ed25519 key used for identification and verification of signatures.
#[derive(Clone, Copy, PartialEq, Eq, StdHash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Create a `PublicKey` from its raw bytes representation.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self, IdentityError> {
        Ok(Self(VerifyingKey::from_bytes(bytes)?))
    }

    /// Bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Convert the public key to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify a signature over the given bytes. Returns `true` if the signature is valid.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let value_len = value.len();
        let checked_value: [u8; PUBLIC_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value_len, PUBLIC_KEY_LENGTH))?;
        Self::from_bytes(&checked_value)
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex::decode(value)?.as_slice())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Create a `Signature` from its raw bytes representation.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    /// Bytes of the signature.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let value_len = value.len();
        let checked_value: [u8; SIGNATURE_LENGTH] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value_len, SIGNATURE_LENGTH))?;
        Ok(Self::from_bytes(&checked_value))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_string()).finish()
    }
}

/// Error types for keys and signatures.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Invalid number of bytes.
    #[error("invalid key or signature length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// String contains invalid hexadecimal characters.
    #[error("invalid hex encoding in key or signature string")]
    InvalidHexEncoding(#[from] hex::FromHexError),

    /// Handle errors from `ed25519` crate.
    #[error(transparent)]
    Ed25519(#[from] ed25519_dalek::ed25519::Error),
}

#[cfg(test)]
mod tests {
    use super::{IdentityError, PrivateKey, PublicKey};

    #[test]
    fn signing() {
        let private_key = PrivateKey::new();
        let public_key = private_key.public_key();
        let bytes = b"entrance granted";
        let signature = private_key.sign(bytes);
        assert!(public_key.verify(bytes, &signature));
        assert!(!public_key.verify(b"entrance denied", &signature));
        assert!(!PrivateKey::new().public_key().verify(bytes, &signature));
    }

    #[test]
    fn parse_public_key() {
        let public_key = PrivateKey::from_bytes(&[7; 32]).public_key();
        let parsed: PublicKey = public_key.to_hex().parse().unwrap();
        assert_eq!(parsed, public_key);

        let result: Result<PublicKey, IdentityError> = "abcd".parse();
        assert!(matches!(result, Err(IdentityError::InvalidLength(2, 32))));
    }
}

// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! RSA cryptography wrappers and parametrization.
//!
//! https://datatracker.ietf.org/doc/html/rfc8017

use crate::pem;
use rsa::RsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::signature::hazmat::PrehashVerifier;
use rsa::signature::{Keypair, SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

/// Size of an RSA key fingerprint (SHA256 hash).
pub const FINGERPRINT_SIZE: usize = 32;

/// SecretKey contains an RSA private key usable for signing, with SHA256 as
/// the underlying hash algorithm. Hosts hold these; the service itself only
/// needs them to answer its own challenges from the command line.
#[derive(Clone)]
pub struct SecretKey {
    inner: rsa::pkcs1v15::SigningKey<Sha256>,
}

impl SecretKey {
    /// from_der parses a PKCS#8 DER buffer into a private key.
    pub fn from_der(der: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let inner = rsa::pkcs1v15::SigningKey::<Sha256>::from_pkcs8_der(der)?;
        Ok(Self { inner })
    }

    /// from_pem parses a PKCS#8 PEM string into a private key.
    pub fn from_pem(pem_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        // Crack open the PEM to get to the private key info
        let der = pem::decode_labeled(pem_str.as_bytes(), &["PRIVATE KEY"])?;
        Self::from_der(&der)
    }

    /// public_key retrieves the public counterpart of the secret key.
    pub fn public_key(&self) -> PublicKey {
        let key = self.inner.verifying_key();
        PublicKey { inner: key }
    }

    /// sign creates a PKCS#1 v1.5 signature over the SHA256 hash of the
    /// message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).to_vec()
    }
}

/// PublicKey contains an RSA public key usable for verification, with SHA256
/// as the underlying hash algorithm.
#[derive(Debug, Clone)]
pub struct PublicKey {
    inner: rsa::pkcs1v15::VerifyingKey<Sha256>,
}

impl PublicKey {
    /// from_der parses a DER encoded SubjectPublicKeyInfo into a public key.
    /// Any size and exponent the rsa crate imports is accepted, up to its
    /// 4096 bit modulus cap.
    pub fn from_der(der: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let inner = rsa::pkcs1v15::VerifyingKey::<Sha256>::from_public_key_der(der)?;
        Ok(Self { inner })
    }

    /// to_der serializes a public key into a DER SubjectPublicKeyInfo.
    pub fn to_der(&self) -> Vec<u8> {
        // Encoding an already validated key into memory cannot fail
        rsa::pkcs1v15::VerifyingKey::<Sha256>::to_public_key_der(&self.inner)
            .map(|doc| doc.as_bytes().to_vec())
            .unwrap_or_default()
    }

    /// bits returns the size of the modulus.
    pub fn bits(&self) -> usize {
        let key: &RsaPublicKey = self.inner.as_ref();
        key.n().bits()
    }

    /// fingerprint returns the SHA256 hash of the DER SubjectPublicKeyInfo,
    /// matching `openssl pkey -pubin -outform DER | sha256sum`.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_SIZE] {
        Sha256::digest(self.to_der()).into()
    }

    /// verify_hash verifies a digital signature on an already hashed message.
    pub fn verify_hash(&self, hash: &[u8], signature: &[u8]) -> Result<(), rsa::signature::Error> {
        let sig = rsa::pkcs1v15::Signature::try_from(signature)?;
        self.inner.verify_prehash(hash, &sig)
    }
}

// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Positional public key extraction from X.509 certificates.
//!
//! https://datatracker.ietf.org/doc/html/rfc5280#section-4.1
//!
//! ```text
//! Certificate  ::=  SEQUENCE  {
//!      tbsCertificate       TBSCertificate,
//!      signatureAlgorithm   AlgorithmIdentifier,
//!      signatureValue       BIT STRING  }
//!
//! TBSCertificate  ::=  SEQUENCE  {
//!      version         [0]  EXPLICIT Version DEFAULT v1,
//!      serialNumber         CertificateSerialNumber,
//!      signature            AlgorithmIdentifier,
//!      issuer               Name,
//!      validity             Validity,
//!      subject              Name,
//!      subjectPublicKeyInfo SubjectPublicKeyInfo,
//!      ... }
//! ```
//!
//! The subject key sits at a fixed position: index 6 when the explicit
//! version is present, index 5 for v1 certificates that omit it.

use crate::der::{self, Reader, Tag};
use crate::{pem, rsa};

/// OID for rsaEncryption: 1.2.840.113549.1.1.1
const RSA_ENCRYPTION_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// Position of subjectPublicKeyInfo after the version (or serial) field.
const SPKI_INDEX_AFTER_VERSION: usize = 5;

/// Error type used by x509 APIs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PEM decoding error: {details}")]
    Pem { details: String },
    #[error(transparent)]
    Der(#[from] der::Error),
    #[error("subject key algorithm is not rsaEncryption")]
    UnsupportedKeyAlgorithm,
    #[error("RSA key import error: {details}")]
    KeyImport { details: String },
}

/// Result type used by x509 APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// decode_certificate_pem converts a single `CERTIFICATE` PEM block to DER.
pub fn decode_certificate_pem(pem_data: &[u8]) -> Result<Vec<u8>> {
    pem::decode_labeled(pem_data, &["CERTIFICATE"]).map_err(|e| Error::Pem {
        details: e.to_string(),
    })
}

/// subject_public_key_info locates the raw DER encoding of the certificate's
/// SubjectPublicKeyInfo, without interpreting anything else in it.
pub fn subject_public_key_info(der: &[u8]) -> Result<&[u8]> {
    // Certificate must be a single SEQUENCE, TBSCertificate its first child
    let cert = der::parse(der)?.expect(Tag::Sequence)?;
    let tbs = cert.children()?.read_expect(Tag::Sequence)?;

    // Skip the optional explicit version, then walk to the key position
    let mut fields: Reader<'_> = tbs.children()?;
    if fields.peek_tag()?
        == (Tag::ContextSpecific {
            number: 0,
            constructed: true,
        })
    {
        fields.skip(1)?;
    }
    fields.skip(SPKI_INDEX_AFTER_VERSION)?;
    let spki = fields.read_expect(Tag::Sequence)?;

    // The algorithm identifier must name a plain RSA key
    let algorithm = spki.children()?.read_expect(Tag::Sequence)?;
    let oid = algorithm.children()?.read_expect(Tag::ObjectIdentifier)?;
    if oid.content() != RSA_ENCRYPTION_OID {
        return Err(Error::UnsupportedKeyAlgorithm);
    }
    Ok(spki.raw())
}

/// public_key extracts and imports the RSA subject key of a DER certificate.
pub fn public_key(der: &[u8]) -> Result<rsa::PublicKey> {
    let spki = subject_public_key_info(der)?;
    rsa::PublicKey::from_der(spki).map_err(|e| Error::KeyImport {
        details: e.to_string(),
    })
}

// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! PKCS#10 certificate signing request parsing.
//!
//! https://datatracker.ietf.org/doc/html/rfc2986

use crate::name::is_valid_name;
use crate::pem;
use const_oid::ObjectIdentifier;
use der::{Decode, Tag, Tagged};
use x509_cert::request::CertReq;

/// OID for CommonName (2.5.4.3).
const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// PEM labels a request may be wrapped in; `openssl req -newhdr` emits the
/// second one.
const CSR_LABELS: &[&str] = &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// Error type used by CSR parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PEM decoding error: {details}")]
    Pem { details: String },
    #[error(transparent)]
    Der(#[from] der::Error),
    #[error("subject has no common name")]
    MissingCommonName,
    #[error("subject has more than one common name")]
    MultipleCommonNames,
    #[error("common name is not a text string")]
    CommonNameEncoding,
    #[error("invalid characters in common name")]
    InvalidCommonName,
}

impl Error {
    /// is_name_error reports whether the request itself parsed, but the name
    /// it asks for is unacceptable.
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            Error::MissingCommonName
                | Error::MultipleCommonNames
                | Error::CommonNameEncoding
                | Error::InvalidCommonName
        )
    }
}

/// Result type used by CSR parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Request is a parsed signing request with a validated common name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    common_name: String,
}

impl Request {
    /// from_pem parses a PEM encoded request and validates its common name.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let der = pem::decode_labeled(data, CSR_LABELS).map_err(|e| Error::Pem {
            details: e.to_string(),
        })?;
        Self::from_der(&der)
    }

    /// from_der parses a DER encoded request and validates its common name.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let req = CertReq::from_der(der)?;
        let common_name = common_name(&req)?;
        if !is_valid_name(&common_name) {
            return Err(Error::InvalidCommonName);
        }
        Ok(Self { common_name })
    }

    /// common_name returns the host name the request asks a certificate for.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }
}

// common_name extracts the single text CN attribute from the subject.
fn common_name(req: &CertReq) -> Result<String> {
    let mut found = None;
    for rdn in req.info.subject.0.iter() {
        for attr in rdn.0.iter().filter(|attr| attr.oid == OID_CN) {
            if found.is_some() {
                return Err(Error::MultipleCommonNames);
            }
            let text = match attr.value.tag() {
                Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
                    std::str::from_utf8(attr.value.value()).map_err(|_| Error::CommonNameEncoding)?
                }
                _ => return Err(Error::CommonNameEncoding),
            };
            found = Some(text.to_string());
        }
    }
    found.ok_or(Error::MissingCommonName)
}

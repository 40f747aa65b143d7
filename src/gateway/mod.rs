// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Signature gated certificate release.
//!
//! A host fetches its signed certificate by presenting a PKCS#1 v1.5 signature
//! over the SHA256 hash of its own name, made with the private key matching
//! the certificate. The newest certificate issued for the name is loaded, its
//! public key is dug out of the DER, and the certificate is released only if
//! that key verifies the signature.

use crate::config::{Config, RevocationPolicy};
use crate::index::Index;
use crate::name::is_valid_name;
use crate::{rsa, x509};
use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Base64url decoder accepting signatures with or without padding.
const SIGNATURE_ENCODING: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Error is the ways a retrieval can be denied. Everything except a badly
/// encoded signature renders identically, so a caller cannot tell a missing
/// certificate from a failed signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("bad signature encoding")]
    BadSignatureEncoding,
    #[error("forbidden")]
    NotFound,
    #[error("forbidden")]
    KeyExtractionFailed,
    #[error("forbidden")]
    AuthorizationFailed,
    #[error("forbidden")]
    Revoked,
}

impl Error {
    /// status maps the denial to the HTTP status reported to the host.
    pub fn status(&self) -> u16 {
        match self {
            Error::BadSignatureEncoding => 400,
            Error::NotFound
            | Error::KeyExtractionFailed
            | Error::AuthorizationFailed
            | Error::Revoked => 403,
        }
    }
}

/// Result type used by the gateway.
pub type Result<T> = std::result::Result<T, Error>;

/// Certificate is a stored certificate whose public key has been extracted.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub host: String,
    pub serial: u32,
    pub raw_pem: Vec<u8>,
    pub public_key: rsa::PublicKey,
}

// Candidate is a certificate file name matching a host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    serial: u32,
    file_name: String,
}

/// Gateway releases certificates from the certificate directory.
#[derive(Debug, Clone)]
pub struct Gateway {
    cert_dir: PathBuf,
    index: PathBuf,
    revocation: RevocationPolicy,
}

impl Gateway {
    /// new creates a gateway over the configured certificate directory.
    pub fn new(config: &Config) -> Self {
        Self {
            cert_dir: config.cert_dir.clone(),
            index: config.index.clone(),
            revocation: config.revocation,
        }
    }

    /// retrieve returns the PEM bytes of the host's current certificate if the
    /// base64url signature over the host name verifies against its key.
    pub fn retrieve(&self, host_name: &str, signature_b64url: &str) -> Result<Vec<u8>> {
        let host = normalize_host(host_name)?;
        let signature = SIGNATURE_ENCODING
            .decode(signature_b64url.trim())
            .map_err(|err| {
                warn!(%err, host, "failed to decode signature");
                Error::BadSignatureEncoding
            })?;
        debug!(host, "got request for certificate");

        let cert = self.load_current(host)?;

        // Verify the challenge using the public key in the certificate
        let digest = Sha256::digest(host.as_bytes());
        cert.public_key
            .verify_hash(&digest, &signature)
            .map_err(|err| {
                warn!(%err, host, serial = cert.serial, "signature verification failed");
                Error::AuthorizationFailed
            })?;

        info!(host, serial = cert.serial, "released certificate");
        Ok(cert.raw_pem)
    }

    /// load_current selects the host's newest certificate and extracts its
    /// public key.
    pub fn load_current(&self, host: &str) -> Result<Certificate> {
        let candidates = self.candidates(host)?;
        let candidates = self.apply_revocation(host, candidates)?;

        let Some(chosen) = select_current(&candidates) else {
            warn!(host, "no certificate found");
            return Err(Error::NotFound);
        };
        if candidates.len() > 1 {
            warn!(
                host,
                matches = candidates.len(),
                file = %chosen.file_name,
                "multiple certificate matches, using the highest serial"
            );
        }
        let path = self.cert_dir.join(&chosen.file_name);
        let raw_pem = fs::read(&path).map_err(|err| {
            warn!(%err, path = %path.display(), "failed to open certificate");
            Error::NotFound
        })?;

        let public_key = x509::decode_certificate_pem(&raw_pem)
            .and_then(|der| x509::public_key(&der))
            .map_err(|err| {
                warn!(%err, file = %chosen.file_name, "importing key failed");
                Error::KeyExtractionFailed
            })?;
        debug!(
            host,
            serial = chosen.serial,
            bits = public_key.bits(),
            fingerprint = %hex::encode(public_key.fingerprint()),
            "extracted certificate key"
        );
        Ok(Certificate {
            host: host.to_string(),
            serial: chosen.serial,
            raw_pem,
            public_key,
        })
    }

    // candidates lists the certificate files issued for the host.
    fn candidates(&self, host: &str) -> Result<Vec<Candidate>> {
        let entries = fs::read_dir(&self.cert_dir).map_err(|err| {
            warn!(%err, dir = %self.cert_dir.display(), "failed to list certificates");
            Error::NotFound
        })?;
        let candidates = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|file_name| {
                let serial = match_file_name(&file_name, host)?;
                Some(Candidate { serial, file_name })
            })
            .collect();
        Ok(candidates)
    }

    // apply_revocation drops candidates the index does not list as usable,
    // when the policy asks for it.
    fn apply_revocation(&self, host: &str, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        if self.revocation == RevocationPolicy::Ignore || candidates.is_empty() {
            return Ok(candidates);
        }
        let index = Index::load(&self.index).map_err(|err| {
            warn!(%err, "failed to load certificate index");
            Error::Revoked
        })?;
        let now = Utc::now();
        let usable: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| {
                index
                    .find(host, candidate.serial)
                    .is_some_and(|entry| entry.is_usable(now))
            })
            .collect();
        if usable.is_empty() {
            warn!(host, "every certificate is revoked, expired or unknown");
            return Err(Error::Revoked);
        }
        Ok(usable)
    }
}

// normalize_host reduces the requested name to a bare host name, refusing
// anything that could not have been issued a certificate.
fn normalize_host(host_name: &str) -> Result<&str> {
    let host = Path::new(host_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if !is_valid_name(host) || host == "." || host == ".." {
        warn!(host_name, "refusing invalid host name");
        return Err(Error::NotFound);
    }
    Ok(host)
}

// match_file_name checks for `<host>.<serial>.pem` with a 2 to 6 digit hex
// serial, returning the serial.
fn match_file_name(file_name: &str, host: &str) -> Option<u32> {
    let serial = file_name
        .strip_prefix(host)?
        .strip_prefix('.')?
        .strip_suffix(".pem")?;
    if !(2..=6).contains(&serial.len()) || !serial.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(serial, 16).ok()
}

// select_current picks the highest serial, breaking ties on the file name so
// the choice never depends on directory order.
fn select_current(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .max_by(|a, b| (a.serial, &a.file_name).cmp(&(b.serial, &b.file_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE as URL_SAFE_PADDED, URL_SAFE_NO_PAD};

    const CERT_V1: &str = include_str!("../../testdata/example.amp.01.pem");
    const CERT_V3: &str = include_str!("../../testdata/example.amp.0a.pem");
    const CERT_EC: &str = include_str!("../../testdata/ec.amp.01.pem");
    const HOST_KEY: &str = include_str!("../../testdata/host.key");
    const OTHER_KEY: &str = include_str!("../../testdata/other.key");
    const CERT_WEAK: &str = include_str!("../../testdata/weak.amp.01.pem");
    const CERT_E3: &str = include_str!("../../testdata/e3.amp.01.pem");
    const WEAK_KEY: &str = include_str!("../../testdata/weak.key");
    const E3_KEY: &str = include_str!("../../testdata/e3.key");

    // setup creates a certificate directory holding the given files.
    fn setup(files: &[(&str, &[u8])]) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_ca_dir(dir.path());
        fs::create_dir(&config.cert_dir).unwrap();
        for (name, data) in files {
            fs::write(config.cert_dir.join(name), data).unwrap();
        }
        (dir, config)
    }

    fn challenge(key: &str, host: &str) -> String {
        let secret = rsa::SecretKey::from_pem(key).unwrap();
        URL_SAFE_PADDED.encode(secret.sign(host.as_bytes()))
    }

    #[test]
    fn test_release_round_trip() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        let pem = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap();
        assert_eq!(pem, CERT_V1.as_bytes());
    }

    #[test]
    fn test_release_accepts_unpadded_signature() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        let secret = rsa::SecretKey::from_pem(HOST_KEY).unwrap();
        let signature = URL_SAFE_NO_PAD.encode(secret.sign(b"example.amp"));
        assert_eq!(gateway.retrieve("example.amp", &signature).unwrap(), CERT_V1.as_bytes());
    }

    #[test]
    fn test_signature_over_other_name() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        let err = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "other.amp"))
            .unwrap_err();
        assert_eq!(err, Error::AuthorizationFailed);
        assert_eq!(err.status(), 403);
    }

    #[test]
    fn test_signature_from_other_key() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        let err = gateway
            .retrieve("example.amp", &challenge(OTHER_KEY, "example.amp"))
            .unwrap_err();
        assert_eq!(err, Error::AuthorizationFailed);
    }

    // With serials 01 and 0a present the renewal (0x0a) must be served, which
    // is provable because only the renewal key verifies.
    #[test]
    fn test_selects_highest_serial() {
        let (_dir, config) = setup(&[
            ("example.amp.01.pem", CERT_V1.as_bytes()),
            ("example.amp.0a.pem", CERT_V3.as_bytes()),
        ]);
        let gateway = Gateway::new(&config);

        let pem = gateway
            .retrieve("example.amp", &challenge(OTHER_KEY, "example.amp"))
            .unwrap();
        assert_eq!(pem, CERT_V3.as_bytes());

        let err = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap_err();
        assert_eq!(err, Error::AuthorizationFailed);
    }

    #[test]
    fn test_select_current_is_numeric() {
        let names = ["host.09.pem", "host.1f.pem", "host.a.pem", "host.0A.pem"];
        let candidates: Vec<Candidate> = names
            .iter()
            .filter_map(|name| {
                Some(Candidate {
                    serial: match_file_name(name, "host")?,
                    file_name: name.to_string(),
                })
            })
            .collect();
        assert_eq!(candidates.len(), 3);
        assert_eq!(select_current(&candidates).unwrap().file_name, "host.1f.pem");

        let candidates = vec![
            Candidate {
                serial: 0x0a,
                file_name: "host.0a.pem".into(),
            },
            Candidate {
                serial: 0x09,
                file_name: "host.09.pem".into(),
            },
            Candidate {
                serial: 0x0a,
                file_name: "host.00a.pem".into(),
            },
        ];
        assert_eq!(select_current(&candidates).unwrap().file_name, "host.0a.pem");
        assert!(select_current(&[]).is_none());
    }

    #[test]
    fn test_match_file_name() {
        assert_eq!(match_file_name("example.amp.01.pem", "example.amp"), Some(0x01));
        assert_eq!(match_file_name("example.amp.ABCDEF.pem", "example.amp"), Some(0xabcdef));
        assert_eq!(match_file_name("example.amp.1.pem", "example.amp"), None);
        assert_eq!(match_file_name("example.amp.1234567.pem", "example.amp"), None);
        assert_eq!(match_file_name("example.amp.0g.pem", "example.amp"), None);
        assert_eq!(match_file_name("example.amp.01.pem.bak", "example.amp"), None);
        assert_eq!(match_file_name("example.amp.01.pem", "example"), None);
        assert_eq!(match_file_name("exampleXamp.01.pem", "example.amp"), None);
        assert_eq!(match_file_name("sub.example.amp.01.pem", "example.amp"), None);
        assert_eq!(match_file_name("example.amp.+1.pem", "example.amp"), None);
    }

    #[test]
    fn test_missing_certificate() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        // A perfectly good signature does not help when nothing is issued
        for host in ["other.amp", "example", "example.amp.01"] {
            let err = gateway.retrieve(host, &challenge(HOST_KEY, host)).unwrap_err();
            assert_eq!(err, Error::NotFound, "{host}");
            assert_eq!(err.status(), 403);
        }
        let err = gateway.retrieve("other.amp", "AAAA").unwrap_err();
        assert_eq!(err, Error::NotFound);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(&Config::with_ca_dir(dir.path()));
        let err = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap_err();
        assert_eq!(err, Error::NotFound);
    }

    #[test]
    fn test_host_name_normalization() {
        assert_eq!(normalize_host("example.amp").unwrap(), "example.amp");
        assert_eq!(normalize_host("../../certs/example.amp").unwrap(), "example.amp");
        assert_eq!(normalize_host("/etc/passwd").unwrap(), "passwd");
        assert_eq!(normalize_host("trailing/").unwrap(), "trailing");
        for host in ["", ".", "..", "../..", "/", "bad name", "bad_name"] {
            assert_eq!(normalize_host(host), Err(Error::NotFound), "{host:?}");
        }

        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);
        let pem = gateway
            .retrieve("nested/example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap();
        assert_eq!(pem, CERT_V1.as_bytes());
    }

    // Small moduli and exponents other than 65537 are whatever the host chose
    // and must not stand in the way of a valid signature.
    #[test]
    fn test_release_with_uncommon_key_parameters() {
        let (_dir, config) = setup(&[
            ("weak.amp.01.pem", CERT_WEAK.as_bytes()),
            ("e3.amp.01.pem", CERT_E3.as_bytes()),
        ]);
        let gateway = Gateway::new(&config);

        let cert = gateway.load_current("weak.amp").unwrap();
        assert_eq!(cert.public_key.bits(), 1024);
        let pem = gateway
            .retrieve("weak.amp", &challenge(WEAK_KEY, "weak.amp"))
            .unwrap();
        assert_eq!(pem, CERT_WEAK.as_bytes());

        let pem = gateway
            .retrieve("e3.amp", &challenge(E3_KEY, "e3.amp"))
            .unwrap();
        assert_eq!(pem, CERT_E3.as_bytes());

        let err = gateway
            .retrieve("e3.amp", &challenge(WEAK_KEY, "e3.amp"))
            .unwrap_err();
        assert_eq!(err, Error::AuthorizationFailed);
    }

    #[test]
    fn test_bad_signature_encoding() {
        let (_dir, config) = setup(&[("example.amp.01.pem", CERT_V1.as_bytes())]);
        let gateway = Gateway::new(&config);

        for signature in ["not base64!", "a+b/", "A"] {
            let err = gateway.retrieve("example.amp", signature).unwrap_err();
            assert_eq!(err, Error::BadSignatureEncoding, "{signature}");
            assert_eq!(err.status(), 400);
        }
        assert_eq!(
            gateway.retrieve("example.amp", "").unwrap_err(),
            Error::AuthorizationFailed
        );
    }

    #[test]
    fn test_key_extraction_failures() {
        let der = x509::decode_certificate_pem(CERT_V3.as_bytes()).unwrap();
        let truncated = crate::pem::encode("CERTIFICATE", &der[..der.len() / 3]);

        let (_dir, config) = setup(&[
            ("trunc.amp.01.pem", truncated.as_bytes()),
            ("garbage.amp.01.pem", b"garbage"),
            ("ec.amp.01.pem", CERT_EC.as_bytes()),
        ]);
        let gateway = Gateway::new(&config);

        for host in ["trunc.amp", "garbage.amp", "ec.amp"] {
            let err = gateway.retrieve(host, &challenge(HOST_KEY, host)).unwrap_err();
            assert_eq!(err, Error::KeyExtractionFailed, "{host}");
            assert_eq!(err.status(), 403);
        }
    }

    #[test]
    fn test_denials_are_indistinguishable() {
        let rendered: Vec<String> = [
            Error::NotFound,
            Error::KeyExtractionFailed,
            Error::AuthorizationFailed,
            Error::Revoked,
        ]
        .iter()
        .map(|err| format!("{} {}", err.status(), err))
        .collect();
        assert!(rendered.iter().all(|text| *text == rendered[0]));
    }

    #[test]
    fn test_revocation_policy() {
        let (_dir, mut config) = setup(&[
            ("example.amp.01.pem", CERT_V1.as_bytes()),
            ("example.amp.0a.pem", CERT_V3.as_bytes()),
        ]);
        config.revocation = RevocationPolicy::Enforce;
        let gateway = Gateway::new(&config);

        // Missing index refuses everything
        let err = gateway
            .retrieve("example.amp", &challenge(OTHER_KEY, "example.amp"))
            .unwrap_err();
        assert_eq!(err, Error::Revoked);

        // Renewal revoked: fall back to the still valid original
        fs::write(
            &config.index,
            "V\t20991231235959Z\t\t01\tunknown\t/CN=example.amp/O=WAND\n\
             R\t20991231235959Z\t260101000000Z\t0A\tunknown\t/CN=example.amp/O=WAND\n",
        )
        .unwrap();
        let pem = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap();
        assert_eq!(pem, CERT_V1.as_bytes());

        // Everything revoked or expired
        fs::write(
            &config.index,
            "E\t200101000000Z\t\t01\tunknown\t/CN=example.amp/O=WAND\n\
             R\t20991231235959Z\t260101000000Z\t0A\tunknown\t/CN=example.amp/O=WAND\n",
        )
        .unwrap();
        let err = gateway
            .retrieve("example.amp", &challenge(HOST_KEY, "example.amp"))
            .unwrap_err();
        assert_eq!(err, Error::Revoked);
        assert_eq!(err.status(), 403);

        // Ignoring the index serves the newest certificate as before
        config.revocation = RevocationPolicy::Ignore;
        let pem = Gateway::new(&config)
            .retrieve("example.amp", &challenge(OTHER_KEY, "example.amp"))
            .unwrap();
        assert_eq!(pem, CERT_V3.as_bytes());
    }

    #[test]
    fn test_load_current() {
        let (_dir, config) = setup(&[("example.amp.0a.pem", CERT_V3.as_bytes())]);
        let cert = Gateway::new(&config).load_current("example.amp").unwrap();
        assert_eq!(cert.host, "example.amp");
        assert_eq!(cert.serial, 0x0a);
        assert_eq!(cert.raw_pem, CERT_V3.as_bytes());

        let want = rsa::SecretKey::from_pem(OTHER_KEY).unwrap().public_key();
        assert_eq!(cert.public_key.to_der(), want.to_der());
    }
}

// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Certificate signing request intake.
//!
//! Requests are stored verbatim in the pending directory under the lowercase
//! hex SHA256 of their bytes, where the signing tool picks them up. Naming by
//! content makes resubmission idempotent and keeps hosts that ask for the
//! same name from overwriting each other.

use crate::config::Config;
use crate::csr;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// Error is the ways a submission can be turned away. The messages are safe
/// to show to the submitting host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty request body")]
    EmptyBody,
    #[error("malformed certificate signing request")]
    MalformedCsr,
    #[error("invalid common name")]
    InvalidCommonName,
    #[error("failed to store request")]
    StorageFailure,
}

impl Error {
    /// status maps the failure to the HTTP status reported to the host.
    pub fn status(&self) -> u16 {
        match self {
            Error::EmptyBody | Error::MalformedCsr | Error::InvalidCommonName => 400,
            Error::StorageFailure => 500,
        }
    }
}

/// Result type used by the intake store.
pub type Result<T> = std::result::Result<T, Error>;

/// Accepted describes a stored (or previously stored) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Lowercase hex SHA256 of the request, also its file name.
    pub hash: String,
    /// Host name the request asks a certificate for.
    pub common_name: String,
    /// Whether this submission wrote the file, false for duplicates.
    pub created: bool,
}

impl Accepted {
    /// status is the HTTP status reported for an accepted request.
    pub fn status(&self) -> u16 {
        202
    }
}

/// Store accepts requests into the pending directory.
#[derive(Debug, Clone)]
pub struct Store {
    csr_dir: PathBuf,
    staging_dir: PathBuf,
}

impl Store {
    /// new creates a store writing into the configured request directory.
    pub fn new(config: &Config) -> Self {
        Self {
            csr_dir: config.csr_dir.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }

    /// submit validates a PEM request and queues it for signing.
    pub fn submit(&self, csr_bytes: &[u8]) -> Result<Accepted> {
        if csr_bytes.is_empty() {
            warn!("rejecting request: empty body");
            return Err(Error::EmptyBody);
        }
        // Make sure this is a valid request before doing anything with it
        let request = csr::Request::from_pem(csr_bytes).map_err(|err| {
            warn!(%err, "rejecting request");
            if err.is_name_error() {
                Error::InvalidCommonName
            } else {
                Error::MalformedCsr
            }
        })?;
        let common_name = request.common_name().to_string();
        let hash = hex::encode(Sha256::digest(csr_bytes));

        let path = self.csr_dir.join(&hash);
        let created = match path.try_exists() {
            Ok(true) => {
                debug!(%common_name, %hash, "request already queued");
                false
            }
            Ok(false) => {
                persist(&self.staging_dir, &path, csr_bytes).map_err(|err| {
                    error!(%err, %hash, "failed to store request");
                    Error::StorageFailure
                })?;
                true
            }
            Err(err) => {
                error!(%err, %hash, "failed to check for queued request");
                return Err(Error::StorageFailure);
            }
        };
        info!(%common_name, %hash, created, "accepted certificate signing request");

        Ok(Accepted {
            hash,
            common_name,
            created,
        })
    }
}

// persist writes the data to a temporary file in the staging directory and
// renames it into place, so the pending directory only ever holds complete
// requests. Racing writers hold identical bytes, so whichever rename lands
// last is equally correct.
fn persist(staging: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    match fs::create_dir(staging) {
        Err(err) if err.kind() != ErrorKind::AlreadyExists => return Err(err),
        _ => {}
    }
    let mut file = NamedTempFile::new_in(staging)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const CSR: &str = include_str!("../../testdata/example.amp.csr");
    const CSR_RENEWAL: &str = include_str!("../../testdata/renewal.csr");
    const CSR_INVALID_CN: &str = include_str!("../../testdata/invalid-cn.csr");
    const CSR_NO_CN: &str = include_str!("../../testdata/no-cn.csr");
    const CSR_MULTI_CN: &str = include_str!("../../testdata/multi-cn.csr");

    fn new_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_ca_dir(dir.path());
        fs::create_dir(&config.csr_dir).unwrap();
        (dir, Store::new(&config))
    }

    fn queued(store: &Store) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&store.csr_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_submit_stores_by_hash() {
        let (_dir, store) = new_store();

        let accepted = store.submit(CSR.as_bytes()).unwrap();
        assert_eq!(accepted.status(), 202);
        assert_eq!(accepted.common_name, "example.amp");
        assert!(accepted.created);
        assert_eq!(accepted.hash, hex::encode(Sha256::digest(CSR.as_bytes())));
        assert_eq!(accepted.hash.len(), 64);
        assert!(accepted.hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));

        assert_eq!(queued(&store), vec![accepted.hash.clone()]);
        let stored = fs::read(store.csr_dir.join(&accepted.hash)).unwrap();
        assert_eq!(stored, CSR.as_bytes());
    }

    #[test]
    fn test_submit_is_idempotent() {
        let (_dir, store) = new_store();

        let first = store.submit(CSR.as_bytes()).unwrap();
        let second = store.submit(CSR.as_bytes()).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.hash, second.hash);
        assert_eq!(queued(&store), vec![first.hash]);

        // A different request for the same name gets its own slot
        let renewal = store.submit(CSR_RENEWAL.as_bytes()).unwrap();
        assert!(renewal.created);
        assert_eq!(queued(&store).len(), 2);
    }

    // Temporaries live outside the pending directory, so neither in-flight
    // writes nor leftovers from a crash look like queued requests.
    #[test]
    fn test_submit_stages_outside_queue() {
        let (_dir, store) = new_store();
        fs::create_dir(&store.staging_dir).unwrap();
        fs::write(store.staging_dir.join(".tmpLEFTOVER"), b"partial").unwrap();

        let accepted = store.submit(CSR.as_bytes()).unwrap();
        assert_eq!(queued(&store), vec![accepted.hash]);

        let staged: Vec<_> = fs::read_dir(&store.staging_dir).unwrap().collect();
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn test_submit_creates_staging_dir() {
        let (_dir, store) = new_store();
        assert!(!store.staging_dir.exists());

        store.submit(CSR.as_bytes()).unwrap();
        assert!(store.staging_dir.is_dir());
        assert_eq!(fs::read_dir(&store.staging_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_identical_submissions() {
        let (_dir, store) = new_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.submit(CSR.as_bytes()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().common_name, "example.amp");
        }
        let names = queued(&store);
        assert_eq!(names.len(), 1);
        assert_eq!(fs::read(store.csr_dir.join(&names[0])).unwrap(), CSR.as_bytes());
    }

    #[test]
    fn test_rejections() {
        let (_dir, store) = new_store();

        let err = store.submit(b"").unwrap_err();
        assert!(matches!(err, Error::EmptyBody));
        assert_eq!(err.status(), 400);

        let err = store.submit(b"this is not a request").unwrap_err();
        assert!(matches!(err, Error::MalformedCsr));
        assert_eq!(err.status(), 400);

        let err = store.submit(CSR_INVALID_CN.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidCommonName));
        assert_eq!(err.status(), 400);

        let err = store.submit(CSR_NO_CN.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidCommonName));

        let err = store.submit(CSR_MULTI_CN.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidCommonName));

        assert!(queued(&store).is_empty());
    }

    #[test]
    fn test_storage_failure_is_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(&Config::with_ca_dir(dir.path().join("missing")));

        let err = store.submit(CSR.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::StorageFailure));
        assert_eq!(err.status(), 500);
        assert!(!err.to_string().contains("missing"));
    }
}

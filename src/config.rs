// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Service configuration.
//!
//! All locations derive from the CA directory unless set explicitly:
//!
//! ```toml
//! ca_dir = "/etc/amplet2/pki"
//! cert_dir = "/etc/amplet2/pki/certs"   # optional
//! csr_dir = "/etc/amplet2/pki/csr"      # optional
//! staging_dir = "/etc/amplet2/pki/csr.staging"  # optional, beside csr_dir
//! index = "/etc/amplet2/pki/index.txt"  # optional
//! revocation = "ignore"                 # or "enforce"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the CA directory.
pub const DEFAULT_CA_DIR: &str = "/etc/amplet2/pki";

/// Error type used while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// RevocationPolicy decides whether the operator's certificate index is
/// consulted before a certificate is released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationPolicy {
    /// Release the newest certificate regardless of its index status.
    #[default]
    Ignore,
    /// Only release certificates the index lists as valid and unexpired.
    Enforce,
}

/// Config holds the file system layout shared with the signing tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ca_dir: PathBuf,
    pub cert_dir: PathBuf,
    pub csr_dir: PathBuf,
    /// Scratch space for partially written requests. Must share a file
    /// system with `csr_dir`.
    pub staging_dir: PathBuf,
    pub index: PathBuf,
    pub revocation: RevocationPolicy,
}

// ConfigFile is the on-disk shape, before defaults are filled in.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    ca_dir: Option<PathBuf>,
    cert_dir: Option<PathBuf>,
    csr_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    index: Option<PathBuf>,
    #[serde(default)]
    revocation: RevocationPolicy,
}

impl Config {
    /// with_ca_dir lays out the standard `certs`, `csr`, `csr.staging` and
    /// `index.txt` locations beneath a CA directory.
    pub fn with_ca_dir(ca_dir: impl Into<PathBuf>) -> Self {
        let ca_dir = ca_dir.into();
        let csr_dir = ca_dir.join("csr");
        Self {
            cert_dir: ca_dir.join("certs"),
            staging_dir: staging_beside(&csr_dir),
            csr_dir,
            index: ca_dir.join("index.txt"),
            ca_dir,
            revocation: RevocationPolicy::default(),
        }
    }

    /// from_toml parses a configuration document.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let file: ConfigFile = toml::from_str(text)?;

        let mut config =
            Self::with_ca_dir(file.ca_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CA_DIR)));
        if let Some(dir) = file.cert_dir {
            config.cert_dir = dir;
        }
        if let Some(dir) = file.csr_dir {
            config.staging_dir = staging_beside(&dir);
            config.csr_dir = dir;
        }
        if let Some(dir) = file.staging_dir {
            config.staging_dir = dir;
        }
        if let Some(path) = file.index {
            config.index = path;
        }
        config.revocation = file.revocation;
        Ok(config)
    }

    /// load reads a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_ca_dir(DEFAULT_CA_DIR)
    }
}

// staging_beside names the sibling `<dir>.staging` of a request directory.
fn staging_beside(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".staging");
    dir.with_file_name(name)
}

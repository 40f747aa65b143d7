// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Reader for the signing tool's flat certificate index.
//!
//! The index is the OpenSSL `ca` database: one tab separated line per issued
//! certificate with the status (`V`, `R` or `E`), the expiry time, the
//! revocation marker (empty unless revoked), the hex serial, the file name
//! (usually `unknown`, and missing from some older files) and the subject
//! DN in slash form.
//!
//! ```text
//! V	361231235959Z		01	unknown	/CN=example.amp/O=WAND
//! R	361231235959Z	260101000000Z,keyCompromise	02	unknown	/CN=old.amp
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Error type used while reading the index.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read index {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("index line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

/// Result type used by the index reader.
pub type Result<T> = std::result::Result<T, Error>;

/// Status of an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Valid,
    Revoked,
    Expired,
}

/// Entry is one issued certificate as recorded by the signing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub status: Status,
    pub expires: DateTime<Utc>,
    pub revoked: Option<String>,
    pub serial: String,
    pub file: Option<String>,
    pub subject: String,
}

impl Entry {
    /// common_name extracts the CN component of the subject DN.
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .split('/')
            .find_map(|part| part.strip_prefix("CN="))
    }

    /// serial_matches compares the recorded serial with a numeric one.
    pub fn serial_matches(&self, serial: u32) -> bool {
        self.serial == format!("{serial:X}")
    }

    /// is_usable reports whether the certificate may still be handed out.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Valid && self.revoked.is_none() && self.expires > now
    }
}

/// Index is the parsed certificate database.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<Entry>,
}

impl Index {
    /// load reads and parses an index file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// parse reads the index from its textual form, skipping blank lines.
    pub fn parse(text: &str) -> Result<Self> {
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| parse_line(line).map_err(|reason| Error::Malformed {
                line: idx + 1,
                reason,
            }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// entries returns every record in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// find looks up the record for a host's certificate serial. The last
    /// matching line wins, as later lines reflect later tool runs.
    pub fn find(&self, host: &str, serial: u32) -> Option<&Entry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.serial_matches(serial) && entry.common_name() == Some(host))
    }
}

// parse_line splits a single index record into its fields.
fn parse_line(line: &str) -> std::result::Result<Entry, &'static str> {
    let fields: Vec<&str> = line.split('\t').collect();
    let (status, expires, revoked, serial, file, subject) = match fields.as_slice() {
        [status, expires, revoked, serial, subject] => {
            (*status, *expires, *revoked, *serial, None, *subject)
        }
        [status, expires, revoked, serial, file, subject] => {
            (*status, *expires, *revoked, *serial, Some(*file), *subject)
        }
        _ => return Err("expected 5 or 6 tab separated fields"),
    };
    let status = match status {
        "V" => Status::Valid,
        "R" => Status::Revoked,
        "E" => Status::Expired,
        _ => return Err("unknown status"),
    };
    if status == Status::Revoked && revoked.is_empty() {
        return Err("revoked entry without revocation time");
    }
    if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("serial is not hexadecimal");
    }
    let serial = serial.trim_start_matches('0').to_ascii_uppercase();
    let serial = if serial.is_empty() { "0".to_string() } else { serial };

    if !subject.starts_with('/') {
        return Err("subject is not a slash separated DN");
    }
    Ok(Entry {
        status,
        expires: parse_time(expires).ok_or("invalid expiry time")?,
        revoked: (!revoked.is_empty()).then(|| revoked.to_string()),
        serial,
        file: file.map(str::to_string),
        subject: subject.to_string(),
    })
}

// parse_time reads an ASN.1 UTCTime (YYMMDDHHMMSSZ, years 50-99 being 19xx)
// or GeneralizedTime (YYYYMMDDHHMMSSZ) timestamp.
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if !text.is_ascii() {
        return None;
    }
    let full = match text.len() {
        13 => {
            let century = if text[..2].parse::<u8>().ok()? < 50 { "20" } else { "19" };
            format!("{century}{text}")
        }
        15 => text.to_string(),
        _ => return None,
    };
    NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

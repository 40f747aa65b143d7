// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Strict PEM encoding and decoding.
//!
//! https://datatracker.ietf.org/doc/html/rfc7468

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::error::Error;

const PEM_HEADER: &[u8] = b"-----BEGIN ";
const PEM_FOOTER: &[u8] = b"-----END ";
const PEM_ENDING: &[u8] = b"-----";

/// Decodes a single PEM block with strict validation.
///
/// Rules:
///   - Header must start at byte 0 (no leading whitespace or explanatory text)
///   - Line endings must be consistent (\n or \r\n throughout)
///   - Base64 lines contain only base64 characters
///   - Strict base64 decoding (no padding errors, etc.)
///   - Only ASCII whitespace may follow the footer
///
/// Returns (kind, data) tuple on success.
pub fn decode(data: &[u8]) -> Result<(String, Vec<u8>), Box<dyn Error>> {
    // Must start with header immediately
    if !data.starts_with(PEM_HEADER) {
        return Err("pem: missing PEM header".into());
    }
    // Find the end of header line (first \n)
    let header_end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or("pem: incomplete PEM header")?;

    // Detect line ending style from first line
    let line_ending: &[u8] = if header_end > 0 && data[header_end - 1] == b'\r' {
        b"\r\n"
    } else {
        b"\n"
    };
    let header = &data[..header_end + 1 - line_ending.len()];

    // Parse the block type from the header
    if !header.ends_with(PEM_ENDING) || header.len() < PEM_HEADER.len() + PEM_ENDING.len() {
        return Err("pem: malformed PEM header".into());
    }
    let block_type = &header[PEM_HEADER.len()..header.len() - PEM_ENDING.len()];
    if block_type.is_empty() {
        return Err("pem: empty PEM block type".into());
    }
    let kind = String::from_utf8(block_type.to_vec())?;

    // Build expected footer and find it
    let mut footer = Vec::with_capacity(PEM_FOOTER.len() + block_type.len() + PEM_ENDING.len());
    footer.extend_from_slice(PEM_FOOTER);
    footer.extend_from_slice(block_type);
    footer.extend_from_slice(PEM_ENDING);

    let search_area = &data[header_end + 1..];
    let footer_idx = search_area
        .windows(footer.len())
        .position(|w| w == footer.as_slice())
        .ok_or("pem: missing PEM footer")?;
    let footer_start = header_end + 1 + footer_idx;
    let footer_end = footer_start + footer.len();

    if !data[footer_end..].iter().all(u8::is_ascii_whitespace) {
        return Err("pem: trailing data after PEM block".into());
    }
    // Body must be non-empty and end with the line ending before the footer
    let body = &data[header_end + 1..footer_start];
    if body.is_empty() {
        return Err("pem: empty PEM body".into());
    }
    if !body.ends_with(line_ending) {
        return Err("pem: body must end with newline before footer".into());
    }
    let body = &body[..body.len() - 1];

    // Strip line endings, rejecting mixed styles, and decode
    let mut b64 = Vec::with_capacity(body.len());
    for line in body.split(|&b| b == b'\n') {
        let line = match line_ending.len() {
            2 => line
                .strip_suffix(b"\r")
                .ok_or("pem: inconsistent line endings")?,
            _ => line,
        };
        if line.contains(&b'\r') {
            return Err("pem: inconsistent line endings".into());
        }
        b64.extend_from_slice(line);
    }
    let decoded = STANDARD.decode(&b64)?;

    Ok((kind, decoded))
}

/// Decodes a single PEM block and checks that its type is one of the allowed
/// labels, returning the DER content.
pub fn decode_labeled(data: &[u8], labels: &[&str]) -> Result<Vec<u8>, Box<dyn Error>> {
    let (kind, der) = decode(data)?;
    if !labels.contains(&kind.as_str()) {
        return Err(format!("pem: unexpected PEM block type {kind}").into());
    }
    Ok(der)
}

/// Encodes data as a PEM block with the given type.
/// Lines are 64 characters, using \n line endings.
pub fn encode(kind: &str, data: &[u8]) -> String {
    let b64 = STANDARD.encode(data);

    let mut buf = String::new();
    buf.push_str("-----BEGIN ");
    buf.push_str(kind);
    buf.push_str("-----\n");

    // Base64 output is pure ASCII, so char boundaries are byte boundaries
    let mut rest = b64.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        buf.push_str(line);
        buf.push('\n');
        rest = tail;
    }
    buf.push_str("-----END ");
    buf.push_str(kind);
    buf.push_str("-----\n");

    buf
}

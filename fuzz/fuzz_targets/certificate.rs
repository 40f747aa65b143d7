// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![no_main]

use amppki::{der, x509};
use libfuzzer_sys::fuzz_target;

// walk recursively visits every element, checking each stays inside the input.
fn walk(reader: &mut der::Reader<'_>, len: usize) {
    while !reader.is_empty() {
        let Ok(element) = reader.read() else {
            return;
        };
        assert!(element.offset() + element.raw().len() <= len);
        if let Ok(mut children) = element.children() {
            walk(&mut children, len);
        }
    }
}

fuzz_target!(|data: &[u8]| {
    walk(&mut der::Reader::new(data), data.len());

    // Raw DER straight into the key extraction path
    if let Ok(spki) = x509::subject_public_key_info(data) {
        assert!(spki.len() <= data.len());
    }
    let _ = x509::public_key(data);

    // The same bytes wrapped as a PEM certificate
    let pem = amppki::pem::encode("CERTIFICATE", data);
    if let Ok(der) = x509::decode_certificate_pem(pem.as_bytes()) {
        assert_eq!(der, data);
    }
});

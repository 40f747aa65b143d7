// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Certificate authority front end for AMP hosts.
//!
//! Hosts submit PEM signing requests through [`intake::Store`] and later
//! collect their signed certificates through [`gateway::Gateway`] by signing
//! their own name with the certified key.

pub mod config;
pub mod csr;
pub mod der;
pub mod gateway;
pub mod index;
pub mod intake;
pub mod name;
pub mod pem;
pub mod rsa;
pub mod x509;

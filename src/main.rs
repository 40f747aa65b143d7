// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use amppki::config::Config;
use amppki::gateway::Gateway;
use amppki::index::Index;
use amppki::intake::Store;
use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amppki", version, about = "AMP certificate request intake and release")]
struct Cli {
    /// Configuration file, defaults to the standard /etc/amplet2/pki layout
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a PEM certificate signing request for signing
    Submit {
        /// Request file, `-` for stdin
        csr: PathBuf,
    },
    /// Release a host's certificate against a signature over its name
    Retrieve {
        host: String,
        /// Base64url PKCS#1 v1.5 signature over SHA256(host)
        signature: String,
        /// Write the certificate here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Produce the retrieval signature for a host from its PKCS#8 key
    Challenge { host: String, key: PathBuf },
    /// List the signing tool's certificate index
    Index {
        /// Only show entries for this host
        #[arg(long)]
        host: Option<String>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    match cli.command {
        Command::Submit { csr } => {
            let data = if csr.as_os_str() == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                fs::read(&csr).with_context(|| format!("failed to read {}", csr.display()))?
            };
            match Store::new(&config).submit(&data) {
                Ok(accepted) => println!("{} {}", accepted.status(), accepted.hash),
                Err(err) => bail!("{} {}", err.status(), err),
            }
        }
        Command::Retrieve {
            host,
            signature,
            out,
        } => {
            let pem = match Gateway::new(&config).retrieve(&host, &signature) {
                Ok(pem) => pem,
                Err(err) => bail!("{} {}", err.status(), err),
            };
            match out {
                Some(path) => fs::write(&path, &pem)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => io::stdout().write_all(&pem)?,
            }
        }
        Command::Challenge { host, key } => {
            let pem = fs::read_to_string(&key)
                .with_context(|| format!("failed to read {}", key.display()))?;
            let secret = amppki::rsa::SecretKey::from_pem(&pem)
                .map_err(|err| anyhow::anyhow!("invalid private key: {err}"))?;
            println!("{}", URL_SAFE.encode(secret.sign(host.as_bytes())));
        }
        Command::Index { host } => {
            let index = Index::load(&config.index)?;
            for entry in index.entries() {
                if host.is_some() && entry.common_name() != host.as_deref() {
                    continue;
                }
                println!(
                    "{:?}\t{}\t{}\t{}",
                    entry.status,
                    entry.serial,
                    entry.expires.format("%Y-%m-%d %H:%M:%S"),
                    entry.subject
                );
            }
        }
    }
    Ok(())
}

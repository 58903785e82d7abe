//! Detached-signature production and verification over `.loads` manifests.
//!
//! Two key sources are supported, modeled as a tagged enum rather than a
//! class hierarchy: a local PEM private key (paired with a certificate for
//! public-key extraction), or a ticket that authorizes a remote signing
//! service to sign on our behalf.

use crate::error::{self, Result};
use crate::hash::sha512;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Where a `.loads` signature comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// A local PEM private key, signed with via `openssl dgst -sha512
    /// -sign`. The paired certificate is used to extract the public key.
    Local { key: PathBuf, cert: PathBuf },
    /// An opaque ticket file that authorizes `signing_client` (an external
    /// program, analogous to the reference `swims_client`) to sign a SHA-512
    /// digest on our behalf.
    RemoteTicket {
        ticket: PathBuf,
        signing_client: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    public_key: String,
}

/// Sign the file at `path` with `key_source`, returning the raw signature
/// bytes.
pub fn sign(path: &Path, key_source: &KeySource) -> Result<Vec<u8>> {
    match key_source {
        KeySource::Local { key, .. } => local_sign(path, key),
        KeySource::RemoteTicket {
            ticket,
            signing_client,
        } => remote_sign(path, ticket, signing_client),
    }
}

/// Sign the file at `path` with `key_source`, writing the signature to
/// `store` atomically (via a temp file + rename in the same directory).
pub fn sign_to_path(path: &Path, key_source: &KeySource, store: &Path) -> Result<()> {
    let sig = sign(path, key_source)?;
    let dir = store.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).context(error::WriteSnafu { path: dir })?;
    use std::io::Write;
    tmp.write_all(&sig).context(error::WriteSnafu { path: store })?;
    tmp.persist(store)
        .map_err(|e| e.error)
        .context(error::WriteSnafu { path: store })?;
    Ok(())
}

/// Verify that `sig` is a valid RSA-SHA512 signature of `path` under
/// `pubkey` (PEM bytes). Returns `Ok(false)` on a negative verification,
/// reserving `Err` for infrastructure failures (missing openssl, I/O
/// errors, etc).
pub fn verify(path: &Path, sig: &[u8], pubkey: &[u8]) -> Result<bool> {
    use std::io::Write;
    let openssl = which::which("openssl").context(error::ToolNotFoundSnafu { name: "openssl" })?;

    let sig_file = tempfile::NamedTempFile::new().context(error::WriteSnafu { path: Path::new("<tmp sig>") })?;
    std::fs::write(sig_file.path(), sig).context(error::WriteSnafu { path: sig_file.path() })?;

    let mut child = Command::new(&openssl)
        .args(["dgst", "-sha512", "-verify", "-", "-signature"])
        .arg(sig_file.path())
        .arg(path)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context(error::SpawnSnafu {
            command: "openssl dgst -sha512 -verify".to_string(),
        })?;
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(pubkey)
        .context(error::WriteSnafu { path: Path::new("<openssl stdin>") })?;
    let output = child.wait_with_output().context(error::SpawnSnafu {
        command: "openssl dgst -sha512 -verify".to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(output.status.success() && stdout.trim() == "Verified OK")
}

/// Extract the public key (PEM bytes) corresponding to `key_source`.
pub fn public_key_of(key_source: &KeySource) -> Result<Vec<u8>> {
    match key_source {
        KeySource::Local { cert, .. } => pubkey_from_cert(cert),
        KeySource::RemoteTicket {
            ticket,
            signing_client,
        } => pubkey_from_ticket(ticket, signing_client),
    }
}

fn local_sign(path: &Path, key: &Path) -> Result<Vec<u8>> {
    ensure!(key.is_file(), error::KeyFileSnafu {
        path: key.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    });
    let openssl = which::which("openssl").context(error::ToolNotFoundSnafu { name: "openssl" })?;
    let command = format!(
        "{} dgst -sign {} -sha512 {}",
        openssl.display(),
        key.display(),
        path.display()
    );
    let output = Command::new(&openssl)
        .args(["dgst", "-sign"])
        .arg(key)
        .arg("-sha512")
        .arg(path)
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    ensure!(
        output.status.success(),
        error::ExternalToolSnafu {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    Ok(output.stdout)
}

fn pubkey_from_cert(cert: &Path) -> Result<Vec<u8>> {
    let openssl = which::which("openssl").context(error::ToolNotFoundSnafu { name: "openssl" })?;
    let command = format!("{} x509 -in {} -pubkey", openssl.display(), cert.display());
    let output = Command::new(&openssl)
        .args(["x509", "-in"])
        .arg(cert)
        .arg("-pubkey")
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    ensure!(
        output.status.success(),
        error::ExternalToolSnafu {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    Ok(output.stdout)
}

fn remote_sign(path: &Path, ticket: &Path, signing_client: &Path) -> Result<Vec<u8>> {
    ensure!(ticket.is_file(), error::KeyFileSnafu {
        path: ticket.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    });
    let digest = sha512(path)?;
    let command = format!(
        "{} sign-hash --ticket {} --hash {}",
        signing_client.display(),
        ticket.display(),
        digest
    );
    let output = Command::new(signing_client)
        .args(["sign-hash", "--ticket"])
        .arg(ticket)
        .args(["--hash", &digest])
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    ensure!(
        output.status.success(),
        error::ExternalToolSnafu {
            command: command.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    let response: SignResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
        error::Error::SigningServiceResponse {
            reason: e.to_string(),
        }
    })?;
    BASE64
        .decode(response.signature)
        .context(error::SignatureBase64Snafu)
}

fn pubkey_from_ticket(ticket: &Path, signing_client: &Path) -> Result<Vec<u8>> {
    ensure!(ticket.is_file(), error::KeyFileSnafu {
        path: ticket.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    });
    let command = format!(
        "{} fetch-pubkey --ticket {}",
        signing_client.display(),
        ticket.display()
    );
    let output = Command::new(signing_client)
        .args(["fetch-pubkey", "--ticket"])
        .arg(ticket)
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    ensure!(
        output.status.success(),
        error::ExternalToolSnafu {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    let response: PublicKeyResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
        error::Error::SigningServiceResponse {
            reason: e.to_string(),
        }
    })?;
    let mut pem = Vec::new();
    pem.extend_from_slice(b"-----BEGIN PUBLIC KEY-----\n");
    pem.extend_from_slice(response.public_key.as_bytes());
    pem.extend_from_slice(b"\n-----END PUBLIC KEY-----\n");
    Ok(pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::process::Stdio;

    fn have_openssl() -> bool {
        which::which("openssl").is_ok()
    }

    fn gen_rsa_keypair(dir: &Path) -> (PathBuf, PathBuf) {
        let key = dir.join("key.pem");
        let cert = dir.join("cert.pem");
        let status = Command::new("openssl")
            .args([
                "req",
                "-x509",
                "-newkey",
                "rsa:2048",
                "-keyout",
            ])
            .arg(&key)
            .args(["-out"])
            .arg(&cert)
            .args(["-days", "1", "-nodes", "-subj", "/CN=test"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success());
        (key, cert)
    }

    #[test]
    fn sign_then_verify_round_trips() {
        if !have_openssl() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (key, cert) = gen_rsa_keypair(dir.path());
        let file = dir.path().join("data.loads");
        std::fs::write(&file, b"some manifest bytes").unwrap();

        let source = KeySource::Local { key, cert };
        let sig = sign(&file, &source).unwrap();
        let pubkey = public_key_of(&source).unwrap();
        assert!(verify(&file, &sig, &pubkey).unwrap());
    }

    #[test]
    fn tampered_file_fails_verification() {
        if !have_openssl() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (key, cert) = gen_rsa_keypair(dir.path());
        let file = dir.path().join("data.loads");
        std::fs::write(&file, b"some manifest bytes").unwrap();

        let source = KeySource::Local { key, cert };
        let sig = sign(&file, &source).unwrap();
        let pubkey = public_key_of(&source).unwrap();

        std::fs::write(&file, b"tampered manifest bytes").unwrap();
        assert!(!verify(&file, &sig, &pubkey).unwrap());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        if !have_openssl() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (key, cert) = gen_rsa_keypair(dir.path());
        let file = dir.path().join("data.loads");
        std::fs::write(&file, b"some manifest bytes").unwrap();

        let source = KeySource::Local { key, cert };
        let mut sig = sign(&file, &source).unwrap();
        let pubkey = public_key_of(&source).unwrap();
        let last = sig.len() - 1;
        sig[last] ^= 0xff;
        assert!(!verify(&file, &sig, &pubkey).unwrap());
    }

    #[test]
    fn sign_to_path_writes_file() {
        if !have_openssl() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (key, cert) = gen_rsa_keypair(dir.path());
        let file = dir.path().join("data.loads");
        std::fs::write(&file, b"some manifest bytes").unwrap();
        let sig_path = dir.path().join("data.loads.sgn");

        let source = KeySource::Local { key, cert };
        sign_to_path(&file, &source, &sig_path).unwrap();
        assert!(sig_path.is_file());
    }
}

//! Streaming SHA-512 digests and OS route lookups.
//!
//! `route` and `guess_local_ip` shell out to `ip route get`, mirroring the
//! reference implementation's use of `ip -o route get`.

use crate::error::{self, Result};
use sha2::{Digest, Sha512};
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::process::Command;

const READ_CHUNK: usize = 1024 * 1024;

/// Return the lowercase hex SHA-512 digest of the file at `path`, streamed in
/// 1 MiB chunks so large packages are never fully buffered.
pub fn sha512(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).context(error::ReadSnafu { path })?;
    let mut digest = Sha512::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).context(error::ReadSnafu { path })?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(hex::encode(digest.finalize()))
}

/// Result of a single `ip route get` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub via: Option<String>,
    pub dev: String,
    pub src: String,
}

/// Consult the OS routing table for how `addr` would be reached.
pub fn route(addr: &str) -> Result<Route> {
    let ip = which::which("ip").context(error::ToolNotFoundSnafu { name: "ip" })?;
    let command = format!("{} -o route get {}", ip.display(), addr);
    let output = Command::new(ip)
        .args(["-o", "route", "get", addr])
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    if !output.status.success() {
        return error::ExternalToolSnafu {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .fail();
    }
    let line = String::from_utf8(output.stdout)
        .context(error::ExternalToolOutputSnafu { command })?
        .trim_end()
        .to_string();

    // `ip -o route get <addr>` prints one line of whitespace-separated
    // `key value` tokens; pair each token with the one that follows it.
    let words: Vec<&str> = line.split_whitespace().collect();
    let mut next_word: HashMap<&str, &str> = HashMap::new();
    for pair in words.windows(2) {
        next_word.insert(pair[0], pair[1]);
    }

    let dev = next_word
        .get("dev")
        .context(error::RouteParseSnafu {
            reason: format!("no 'dev' token in route output: {line:?}"),
        })?
        .to_string();
    let src = next_word
        .get("src")
        .context(error::RouteParseSnafu {
            reason: format!("no 'src' token in route output: {line:?}"),
        })?
        .to_string();
    let via = next_word.get("via").map(|s| s.to_string());

    Ok(Route { via, dev, src })
}

/// Resolve `peer` to an IP address, the way `getaddrinfo` does for the
/// reference implementation's own route guess. A literal IP address
/// resolves to itself; a hostname is looked up, since `ip route get` only
/// accepts addresses, never names.
fn resolve_peer(peer: &str) -> Result<String> {
    if peer.parse::<std::net::IpAddr>().is_ok() {
        return Ok(peer.to_string());
    }
    let mut addrs = (peer, 80u16)
        .to_socket_addrs()
        .context(error::ResolvePeerSnafu { peer })?;
    let addr = addrs
        .next()
        .context(error::PeerUnresolvedSnafu { peer })?;
    Ok(addr.ip().to_string())
}

/// Guess which local IP address would be used to reach `peer` (default
/// `8.8.8.8`). Does not account for NAT, firewalls or routing policy beyond
/// what the kernel's route table reports.
pub fn guess_local_ip(peer: Option<&str>) -> Result<String> {
    let resolved = resolve_peer(peer.unwrap_or("8.8.8.8"))?;
    Ok(route(&resolved)?.src)
}

//! Remote-shell invocation assembly: SSH address formatting, argument
//! quoting, and jump-host wrapping.

use crate::error::Result;
use loads_metadata::hash::route;
use std::net::Ipv6Addr;

const SSH_OPTS: &str = r#"-o "StrictHostKeyChecking=no" -o "UserKnownHostsFile=/dev/null""#;

/// Append an IPv6 link-local zone identifier when `address` needs one and
/// doesn't already carry it. Non-IPv6 (or already-zoned) addresses pass
/// through unchanged.
pub fn ssh_address(address: &str) -> Result<String> {
    let parsed: std::result::Result<Ipv6Addr, _> = address.parse();
    let Ok(addr) = parsed else {
        return Ok(address.to_string());
    };
    if !is_link_local(&addr) {
        return Ok(address.to_string());
    }
    let dev = route(address)?.dev;
    log::info!("{} is link-local, scoping to interface {}", address, dev);
    Ok(format!("{address}%{dev}"))
}

fn is_link_local(addr: &Ipv6Addr) -> bool {
    let segments = addr.segments();
    (segments[0] & 0xffc0) == 0xfe80
}

/// Build a full `ssh user@destination <quoted remote_cmd>` invocation,
/// with host-key verification disabled (required to reach first-boot or
/// factory-reset devices that carry no known key).
pub fn build_ssh_cmd(user: &str, destination: &str, remote_cmd: &str, ssh: &str) -> String {
    format!(
        "{ssh} {SSH_OPTS} {user}@{destination} {}",
        shell_words::quote(remote_cmd)
    )
}

/// Wrap an already-built `ssh_cmd` as the remote command for a second ssh
/// hop through `via`, so it runs after the jump host connects onward.
pub fn via_wrap(user: &str, via: &str, ssh_cmd: &str, ssh: &str) -> String {
    build_ssh_cmd(user, via, ssh_cmd, ssh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_ipv6_address_passes_through() {
        assert_eq!(ssh_address("device.example.com").unwrap(), "device.example.com");
        assert_eq!(ssh_address("192.168.1.5").unwrap(), "192.168.1.5");
    }

    #[test]
    fn global_ipv6_passes_through_unchanged() {
        assert_eq!(ssh_address("2001:db8::1").unwrap(), "2001:db8::1");
    }

    #[test]
    fn build_ssh_cmd_quotes_remote_command_and_disables_host_key_checks() {
        let cmd = build_ssh_cmd("root", "10.0.0.1", "echo hello; rm -rf /", "ssh");
        assert!(cmd.starts_with("ssh "));
        assert!(cmd.contains("StrictHostKeyChecking=no"));
        assert!(cmd.contains("root@10.0.0.1"));
        assert!(cmd.contains("'echo hello; rm -rf /'"));
    }

    #[test]
    fn via_wrap_nests_the_inner_command_as_a_single_quoted_argument() {
        let inner = build_ssh_cmd("root", "10.0.0.5", "uptime", "ssh");
        let wrapped = via_wrap("root", "10.0.0.1", &inner, "ssh");
        assert!(wrapped.contains("root@10.0.0.1"));
        assert!(wrapped.contains(&shell_words::quote(&inner).into_owned()));
    }
}

// 主机密钥校验
use crate::config::HostKeyPolicy;
use crate::ssh::transport::Endpoint;
use crate::utils::error::TransportError;
use ssh2::{CheckResult, KnownHostFileKind, KnownHostKeyFormat, KnownHosts, Session};
use std::path::Path;

/// Checks the key presented during the handshake against the known hosts file,
/// as `endpoint` (which is the real target for a tunneled session).
pub fn verify(
    session: &Session,
    endpoint: &Endpoint,
    policy: HostKeyPolicy,
    known_hosts_path: Option<&Path>,
) -> Result<(), TransportError> {
    if policy == HostKeyPolicy::Off {
        log::warn!("Host key verification is disabled, accepting key of {}", endpoint);
        return Ok(());
    }

    let reject = |reason: String| TransportError::HostKey {
        host: endpoint.to_string(),
        reason,
    };

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| reject("server did not present a host key".to_string()))?;
    let path = known_hosts_path.ok_or_else(|| reject("no known_hosts file location".to_string()))?;

    let mut known_hosts = session.known_hosts()?;
    if path.exists() {
        known_hosts.read_file(path, KnownHostFileKind::OpenSSH)?;
    }

    let check = known_hosts.check_port(&endpoint.host, endpoint.port, key);
    match decide(check, policy) {
        Decision::Accept => {
            log::debug!("Host key verified for {}", endpoint);
            Ok(())
        }
        Decision::Record => {
            record(&mut known_hosts, path, endpoint, key, key_type.into())?;
            log::info!("Added host key for {} to {}", endpoint, path.display());
            Ok(())
        }
        Decision::Reject(reason) => Err(reject(format!("{} ({})", reason, path.display()))),
    }
}

/// What to do with a host key, given how it compares to known_hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Trust it and add it to known_hosts.
    Record,
    Reject(String),
}

pub fn decide(check: CheckResult, policy: HostKeyPolicy) -> Decision {
    match (check, policy) {
        (_, HostKeyPolicy::Off) => Decision::Accept,
        (CheckResult::Match, _) => Decision::Accept,
        (CheckResult::Mismatch, _) => {
            Decision::Reject("key differs from the recorded one, possible man-in-the-middle".to_string())
        }
        (CheckResult::NotFound, HostKeyPolicy::AcceptNew) => Decision::Record,
        (CheckResult::NotFound, HostKeyPolicy::Strict) => Decision::Reject("host is not listed in known_hosts".to_string()),
        (CheckResult::Failure, _) => Decision::Reject("known_hosts lookup failed".to_string()),
    }
}

/// Adds `key` for `endpoint` and rewrites the known_hosts file at `path`.
fn record(
    known_hosts: &mut KnownHosts,
    path: &Path,
    endpoint: &Endpoint,
    key: &[u8],
    format: KnownHostKeyFormat,
) -> Result<(), TransportError> {
    let name = known_hosts_name(endpoint);
    known_hosts.add(&name, key, &name, format)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    known_hosts.write_file(path, KnownHostFileKind::OpenSSH)?;
    Ok(())
}

/// Name used for a new known_hosts line, OpenSSH style.
fn known_hosts_name(endpoint: &Endpoint) -> String {
    if endpoint.port == crate::ssh::transport::DEFAULT_SSH_PORT {
        endpoint.host.clone()
    } else {
        format!("[{}]:{}", endpoint.host, endpoint.port)
    }
}

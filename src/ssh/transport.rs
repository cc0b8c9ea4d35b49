// 传输层抽象
//
// The client logic only talks to these traits. `ssh::libssh2` provides the real
// implementation on top of the ssh2 crate; tests plug in a recording double.
use crate::utils::error::TransportError;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Endpoint on the standard SSH port.
    pub fn ssh(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_SSH_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login material for one host. Only one variant is active at a time.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password {
        user: String,
        password: String,
    },
    PublicKey {
        user: String,
        key_path: PathBuf,
        passphrase: Option<String>,
    },
    Agent {
        user: String,
    },
}

impl Credential {
    pub fn user(&self) -> &str {
        match self {
            Credential::Password { user, .. }
            | Credential::PublicKey { user, .. }
            | Credential::Agent { user } => user,
        }
    }
}

// 不输出密码
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Credential::PublicKey { user, key_path, .. } => f
                .debug_struct("PublicKey")
                .field("user", user)
                .field("key_path", key_path)
                .finish_non_exhaustive(),
            Credential::Agent { user } => f.debug_struct("Agent").field("user", user).finish(),
        }
    }
}

/// Where to dial and which name the host key must be known under.
///
/// The two only differ for the second hop of a tunnel: the session dials the
/// local forwarded port but the key belongs to the real target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub address: Endpoint,
    pub host_key_name: Endpoint,
}

impl ConnectTarget {
    pub fn direct(endpoint: Endpoint) -> Self {
        Self {
            host_key_name: endpoint.clone(),
            address: endpoint,
        }
    }

    pub fn forwarded(local: Endpoint, target: Endpoint) -> Self {
        Self {
            address: local,
            host_key_name: target,
        }
    }
}

/// Opens authenticated sessions.
pub trait Transport {
    type Session: TransportSession;

    /// Dials, performs the handshake and authenticates. The returned session is
    /// ready to open channels.
    fn connect(&self, target: &ConnectTarget, credential: &Credential) -> Result<Self::Session, TransportError>;
}

/// One authenticated connection able to multiplex channels.
pub trait TransportSession {
    type Exec: ExecChannel;
    type Sftp: SftpChannel;

    /// Opens an exec channel and starts `command` on it with stdin closed.
    fn open_exec(&self, command: &str) -> Result<Self::Exec, TransportError>;

    fn open_sftp(&self) -> Result<Self::Sftp, TransportError>;

    /// Forwards `127.0.0.1:local_port` to `target` through this session.
    fn forward_local(&mut self, local_port: u16, target: &Endpoint) -> Result<(), TransportError>;

    /// Must be safe to call more than once.
    fn disconnect(&mut self);
}

pub trait ExecChannel {
    /// Reads whatever stdout is buffered right now. `Ok(0)` means nothing is
    /// available on this pass; implementations never block here.
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Same contract as `read_stdout` for the stderr stream.
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// True once the remote side has finished and closed its output.
    fn is_closed(&mut self) -> bool;

    /// Remote exit code, `None` if the server never reported one.
    fn exit_status(&mut self) -> Result<Option<i32>, TransportError>;

    /// Must be safe to call more than once.
    fn disconnect(&mut self);
}

/// Sftp channel with a current remote directory, like an interactive sftp shell.
pub trait SftpChannel {
    /// Changes into `dir`, relative to the current directory. `"/"` goes to the root.
    fn cd(&mut self, dir: &str) -> Result<(), TransportError>;

    /// Creates `dir` inside the current directory.
    fn mkdir(&mut self, dir: &str) -> Result<(), TransportError>;

    /// Writes everything from `source` to `name` in the current directory and
    /// returns the number of bytes written.
    fn put(&mut self, source: &mut dyn Read, name: &str) -> Result<u64, TransportError>;

    /// Must be safe to call more than once.
    fn disconnect(&mut self);
}

// 错误类型
use crate::ssh::transport::Endpoint;
use thiserror::Error;

/// Failures raised by a transport implementation (ssh2 or a test double).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Authentication failed for user {user}")]
    AuthenticationFailed { user: String },

    #[error("Host key verification failed for {host}: {reason}")]
    HostKey { host: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the public client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No credential set, call one of the authenticate methods before connecting")]
    AuthConfig,

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },

    #[error("Not connected, call connect or connect_through_default_tunnel first")]
    NotConnected,

    #[error("No gateway configured for tunneled connections")]
    MissingGateway,

    #[error("Tunnel is open to {current}, close the client before tunneling to {requested}")]
    TunnelTargetChanged { current: String, requested: String },

    #[error("Tunnel is open to {current}, close the client before connecting directly to {requested}")]
    TunnelOpen { current: String, requested: String },

    #[error("Command execution failed for `{command}`: {source}")]
    Execution {
        command: String,
        #[source]
        source: TransportError,
    },

    #[error("Command `{command}` timed out")]
    ExecutionTimedOut { command: String },

    #[error("Command `{command}` was cancelled")]
    ExecutionCancelled { command: String },

    #[error("File transfer failed: {source}")]
    Transfer {
        #[source]
        source: TransportError,
    },
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

// SSH模块入口
pub mod client;
pub mod forward;
pub mod host_key;
pub mod libssh2;
pub mod session;
pub mod transport;

pub use client::SshClient;
pub use libssh2::Ssh2Transport;
pub use session::{Route, SessionManager};
pub use transport::{Credential, Endpoint};

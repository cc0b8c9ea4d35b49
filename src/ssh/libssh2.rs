// 基于 ssh2 的传输实现
use crate::config::{ClientConfig, HostKeyPolicy};
use crate::ssh::forward::LocalForward;
use crate::ssh::host_key;
use crate::ssh::transport::{
    ConnectTarget, Credential, Endpoint, ExecChannel, SftpChannel, Transport, TransportSession,
};
use crate::utils::error::TransportError;
use ssh2::{Channel, Session, Sftp};
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Opens real SSH sessions with libssh2.
#[derive(Debug, Clone)]
pub struct Ssh2Transport {
    host_key_policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
    connect_timeout: Duration,
}

impl Ssh2Transport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            host_key_policy: config.host_key_policy,
            known_hosts: config.known_hosts_path(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for Ssh2Transport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Transport for Ssh2Transport {
    type Session = Ssh2Session;

    fn connect(&self, target: &ConnectTarget, credential: &Credential) -> Result<Ssh2Session, TransportError> {
        let tcp = connect_tcp(&target.address, self.connect_timeout)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        host_key::verify(
            &session,
            &target.host_key_name,
            self.host_key_policy,
            self.known_hosts.as_deref(),
        )?;

        match credential {
            Credential::Password { user, password } => {
                session.userauth_password(user, password)?;
            }
            Credential::PublicKey {
                user,
                key_path,
                passphrase,
            } => {
                session.userauth_pubkey_file(user, None, key_path, passphrase.as_deref())?;
            }
            Credential::Agent { user } => {
                session.userauth_agent(user)?;
            }
        }

        if !session.authenticated() {
            return Err(TransportError::AuthenticationFailed {
                user: credential.user().to_string(),
            });
        }

        Ok(Ssh2Session {
            session,
            forward: None,
            connected: true,
        })
    }
}

fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (endpoint.host.as_str(), endpoint.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve to any address", endpoint))
    }))
}

pub struct Ssh2Session {
    session: Session,
    forward: Option<LocalForward>,
    connected: bool,
}

impl TransportSession for Ssh2Session {
    type Exec = Ssh2Exec;
    type Sftp = Ssh2Sftp;

    fn open_exec(&self, command: &str) -> Result<Ssh2Exec, TransportError> {
        self.session.set_blocking(true);
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;
        channel.send_eof()?;
        // 读取时不阻塞
        self.session.set_blocking(false);

        Ok(Ssh2Exec {
            session: self.session.clone(),
            channel,
            open: true,
        })
    }

    fn open_sftp(&self) -> Result<Ssh2Sftp, TransportError> {
        self.session.set_blocking(true);
        let sftp = self.session.sftp()?;
        Ok(Ssh2Sftp {
            sftp: Some(sftp),
            cwd: PathBuf::from("."),
        })
    }

    fn forward_local(&mut self, local_port: u16, target: &Endpoint) -> Result<(), TransportError> {
        let forward = LocalForward::start(self.session.clone(), local_port, target.clone())?;
        self.forward = Some(forward);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut forward) = self.forward.take() {
            forward.stop();
        }
        if self.connected {
            self.connected = false;
            self.session.set_blocking(true);
            if let Err(e) = self.session.disconnect(None, "closing", None) {
                log::debug!("Disconnect failed: {}", e);
            }
        }
    }
}

impl Drop for Ssh2Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub struct Ssh2Exec {
    session: Session,
    channel: Channel,
    open: bool,
}

fn nothing_if_would_block(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

impl ExecChannel for Ssh2Exec {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nothing_if_would_block(self.channel.read(buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nothing_if_would_block(self.channel.stderr().read(buf))
    }

    fn is_closed(&mut self) -> bool {
        self.channel.eof()
    }

    fn exit_status(&mut self) -> Result<Option<i32>, TransportError> {
        self.session.set_blocking(true);
        self.channel.wait_close()?;

        // 被信号终止时没有退出码
        let signal = self.channel.exit_signal()?;
        if let Some(name) = signal.exit_signal {
            log::warn!("Remote command terminated by signal {}", name);
            return Ok(None);
        }
        Ok(Some(self.channel.exit_status()?))
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.session.set_blocking(true);
            if let Err(e) = self.channel.close() {
                log::debug!("Channel close failed: {}", e);
            }
        }
    }
}

impl Drop for Ssh2Exec {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// libssh2 has no notion of a working directory, so it is tracked here.
pub struct Ssh2Sftp {
    sftp: Option<Sftp>,
    cwd: PathBuf,
}

impl Ssh2Sftp {
    fn sftp(&self) -> Result<&Sftp, TransportError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sftp channel is closed").into())
    }

    fn resolve(&self, name: &str) -> PathBuf {
        if name.starts_with('/') {
            PathBuf::from(name)
        } else {
            self.cwd.join(name)
        }
    }
}

impl SftpChannel for Ssh2Sftp {
    fn cd(&mut self, dir: &str) -> Result<(), TransportError> {
        let target = self.resolve(dir);
        let stat = self.sftp()?.stat(&target)?;
        if !stat.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", target.display()),
            )
            .into());
        }
        self.cwd = target;
        Ok(())
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), TransportError> {
        let target = self.resolve(dir);
        self.sftp()?.mkdir(&target, 0o755)?;
        Ok(())
    }

    fn put(&mut self, source: &mut dyn Read, name: &str) -> Result<u64, TransportError> {
        let target = self.resolve(name);
        let mut remote_file = self.sftp()?.create(Path::new(&target))?;
        let written = io::copy(source, &mut remote_file)?;
        // 某些服务器不支持 fsync
        remote_file.fsync().ok();
        Ok(written)
    }

    fn disconnect(&mut self) {
        if self.sftp.take().is_some() {
            log::debug!("Sftp channel closed");
        }
    }
}

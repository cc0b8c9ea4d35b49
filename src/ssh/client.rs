// SSH客户端封装
use crate::config::ClientConfig;
use crate::exec::{self, CancelToken, ExecOptions, ExecutionResult, LogSink, OutputSink};
use crate::ssh::libssh2::Ssh2Transport;
use crate::ssh::session::{Route, SessionManager};
use crate::ssh::transport::{Credential, Transport};
use crate::transfer;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Blocking SSH client: connect directly or through the configured gateway,
/// then run commands and upload files over whichever session is active.
///
/// ```no_run
/// use ssh_ops::{ClientConfig, SshClient};
///
/// let mut client = SshClient::new(ClientConfig::default());
/// client.authenticate_password("deploy", "secret");
/// client.connect("web01.example.org")?;
/// let _status = client.execute_command("hostname; pwd")?;
/// client.close();
/// # Ok::<(), ssh_ops::ClientError>(())
/// ```
pub struct SshClient<T: Transport = Ssh2Transport> {
    sessions: SessionManager<T>,
    exec_options: ExecOptions,
    show_progress: bool,
    sink: Box<dyn OutputSink>,
}

impl SshClient<Ssh2Transport> {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Ssh2Transport::new(&config);
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> SshClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            exec_options: ExecOptions::from_config(&config),
            show_progress: config.show_progress,
            sessions: SessionManager::new(transport, config.gateway),
            sink: Box::new(LogSink::default()),
        }
    }

    /// Where command output goes, the log by default.
    pub fn set_output_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.sink = sink;
    }

    /// Lets another thread abort the running `execute_command`. A cancel only
    /// ends the command it interrupts, later commands run normally.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.exec_options.cancel = Some(token);
    }

    pub fn authenticate(&mut self, credential: Credential) {
        self.sessions.authenticate(credential);
    }

    pub fn authenticate_password(&mut self, user: &str, password: &str) {
        self.authenticate(Credential::Password {
            user: user.to_string(),
            password: password.to_string(),
        });
    }

    /// The matching public key has to be in the remote user's authorized_keys.
    pub fn authenticate_public_key<P: AsRef<Path>>(&mut self, user: &str, private_key: P) {
        self.authenticate(Credential::PublicKey {
            user: user.to_string(),
            key_path: PathBuf::from(private_key.as_ref()),
            passphrase: None,
        });
    }

    pub fn authenticate_agent(&mut self, user: &str) {
        self.authenticate(Credential::Agent { user: user.to_string() });
    }

    pub fn connect(&mut self, host: &str) -> Result<()> {
        self.sessions.connect_direct(host)
    }

    pub fn connect_through_default_tunnel(&mut self, host: &str) -> Result<()> {
        self.sessions.connect_via_tunnel(host)
    }

    /// Runs `command` remotely, output goes to the sink. Returns the exit
    /// status, `EXIT_STATUS_UNOBSERVED` if the server never sent one.
    pub fn execute_command(&mut self, command: &str) -> Result<i32> {
        self.execute(command).map(|result| result.exit_status)
    }

    pub fn execute(&mut self, command: &str) -> Result<ExecutionResult> {
        let session = self.sessions.active_session()?;
        log::debug!("Executing on {:?}: {}", self.sessions.route(), command);
        exec::execute(session, command, &self.exec_options, self.sink.as_mut())
    }

    /// Uploads `paths` into `remote_dir`. True only if every file was copied.
    pub fn copy_files<P: AsRef<Path>>(&mut self, paths: &[P], remote_dir: &str) -> Result<bool> {
        let session = self.sessions.active_session()?;
        log::debug!("Copying {} files over {:?}", paths.len(), self.sessions.route());
        transfer::copy_files(session, paths, remote_dir, self.show_progress)
    }

    pub fn route(&self) -> Option<&Route> {
        self.sessions.route()
    }

    pub fn sessions(&self) -> &SessionManager<T> {
        &self.sessions
    }

    /// Releases every session. Never fails and can be called repeatedly.
    pub fn close(&mut self) {
        self.sessions.close_all();
    }
}

// 配置管理
use crate::cli::{Cli, Commands};
use crate::ssh::transport::{Credential, Endpoint, DEFAULT_SSH_PORT};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use dialoguer::{Confirm, Password};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOCAL_FORWARD_PORT: u16 = 2223;

/// How server host keys are checked against the known hosts file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// The key must already be present and match.
    #[default]
    Strict,
    /// Unknown hosts are trusted and recorded, changed keys are rejected.
    AcceptNew,
    /// No verification at all.
    Off,
}

/// Jump host used by `connect_through_default_tunnel`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSpec {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Local port the target's SSH service is forwarded to.
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    /// Port of the SSH service on the target, as seen from the gateway.
    #[serde(default = "default_ssh_port")]
    pub target_port: u16,
}

impl TunnelSpec {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            password: password.into(),
            local_port: DEFAULT_LOCAL_FORWARD_PORT,
            target_port: DEFAULT_SSH_PORT,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn credential(&self) -> Credential {
        Credential::Password {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("local_port", &self.local_port)
            .field("target_port", &self.target_port)
            .finish_non_exhaustive()
    }
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_FORWARD_PORT
}

/// Settings shared by every connection a client makes. Loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host_key_policy: HostKeyPolicy,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub poll_interval_millis: u64,
    /// `None` lets a remote command run for as long as it likes.
    pub exec_timeout_secs: Option<u64>,
    pub gateway: Option<TunnelSpec>,
    pub show_progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host_key_policy: HostKeyPolicy::Strict,
            known_hosts: None,
            connect_timeout_secs: 30,
            poll_interval_millis: 1000,
            exec_timeout_secs: None,
            gateway: None,
            show_progress: false,
        }
    }
}

impl ClientConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }

    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts
            .clone()
            .or_else(|| home::home_dir().map(|home| home.join(".ssh").join("known_hosts")))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub credential: Credential,
    pub tunnel: bool,
    pub client: ClientConfig,
    pub operation: Operation,
}

#[derive(Debug, Clone)]
pub enum Operation {
    Exec {
        command: String,
    },
    Upload {
        remote_dir: String,
        paths: Vec<PathBuf>,
        extensions: Vec<String>,
    },
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut client = match &cli.config {
            Some(path) => ClientConfig::load_from_file(path)?,
            None => ClientConfig::default(),
        };
        Self::apply_overrides(cli, &mut client)?;

        if cli.tunnel && client.gateway.is_none() {
            bail!("--tunnel needs a gateway, set it in the config file or with --gateway-host");
        }

        let credential = Self::determine_auth_method(cli)?;

        let operation = match &cli.command {
            Commands::Exec { command } => Operation::Exec {
                command: command.join(" "),
            },
            Commands::Upload { remote_dir, paths, ext } => Operation::Upload {
                remote_dir: remote_dir.clone(),
                paths: paths.clone(),
                extensions: ext.clone(),
            },
        };

        Ok(Config {
            host: cli.host.clone(),
            credential,
            tunnel: cli.tunnel,
            client,
            operation,
        })
    }

    fn apply_overrides(cli: &Cli, client: &mut ClientConfig) -> Result<()> {
        if let Some(policy) = cli.host_key_policy {
            client.host_key_policy = policy;
        }
        if let Some(timeout) = cli.timeout {
            client.exec_timeout_secs = Some(timeout);
        }
        if cli.progress {
            client.show_progress = true;
        }

        if let Some(host) = &cli.gateway_host {
            let user = cli
                .gateway_user
                .clone()
                .context("--gateway-host requires --gateway-user")?;
            let password = match &cli.gateway_password {
                Some(password) => password.clone(),
                None => Password::new()
                    .with_prompt(format!("Enter password for gateway {}@{}", user, host))
                    .interact()?,
            };
            let mut spec = TunnelSpec::new(host.clone(), user, password);
            if let Some(port) = cli.gateway_local_port {
                spec.local_port = port;
            }
            client.gateway = Some(spec);
        }
        Ok(())
    }

    fn determine_auth_method(cli: &Cli) -> Result<Credential> {
        let user = cli.username.clone();

        // 命令行提供了密码
        if let Some(password) = &cli.password {
            return Ok(Credential::Password {
                user,
                password: password.clone(),
            });
        }

        if cli.use_agent {
            return Ok(Credential::Agent { user });
        }

        if let Some(key_file) = &cli.key_file {
            return Ok(Credential::PublicKey {
                user,
                key_path: key_file.clone(),
                passphrase: None,
            });
        }

        // 查找默认的SSH密钥
        if let Some(home) = home::home_dir() {
            let ssh_dir = home.join(".ssh");
            for key_name in ["id_rsa", "id_ed25519", "id_ecdsa"] {
                let key_path = ssh_dir.join(key_name);
                if key_path.exists() {
                    let use_key = Confirm::new()
                        .with_prompt(format!("Use SSH key {} for authentication?", key_path.display()))
                        .default(true)
                        .interact()?;

                    if use_key {
                        return Ok(Credential::PublicKey {
                            user,
                            key_path,
                            passphrase: None,
                        });
                    }
                }
            }
        }

        let password = Password::new()
            .with_prompt(format!("Enter password for {}@{}", cli.username, cli.host))
            .interact()?;

        Ok(Credential::Password { user, password })
    }
}

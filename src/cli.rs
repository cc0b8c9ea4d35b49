// 命令行参数解析
use crate::config::HostKeyPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ssh-ops")]
#[command(about = "Run commands and upload files over SSH, directly or through a jump host")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Target host name or IP address
    #[arg(short = 'H', long)]
    pub host: String,

    /// SSH username on the target host
    #[arg(short, long)]
    pub username: String,

    /// SSH password (if no key or agent is used, will prompt for input)
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// SSH private key file path
    #[arg(short, long)]
    pub key_file: Option<PathBuf>,

    /// Use SSH agent for authentication
    #[arg(long)]
    pub use_agent: bool,

    /// JSON config file (gateway, host key policy, timeouts)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Reach the target through the configured gateway
    #[arg(short, long)]
    pub tunnel: bool,

    /// Gateway host, overrides the config file
    #[arg(long)]
    pub gateway_host: Option<String>,

    /// Gateway username
    #[arg(long)]
    pub gateway_user: Option<String>,

    /// Gateway password (prompted for if omitted)
    #[arg(long)]
    pub gateway_password: Option<String>,

    /// Local port the target is forwarded to
    #[arg(long)]
    pub gateway_local_port: Option<u16>,

    /// Host key verification policy
    #[arg(long, value_enum)]
    pub host_key_policy: Option<HostKeyPolicy>,

    /// Give up on a remote command after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Show an upload progress bar
    #[arg(long)]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a command on the remote host, output goes to the log
    Exec {
        /// Command line, e.g. "hostname; pwd"
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Upload files into a remote directory, creating it if needed
    Upload {
        /// Remote destination directory
        remote_dir: String,
        /// Local files, or directories to pick matching files from
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Extensions picked from directories
        #[arg(short, long, value_delimiter = ',', default_values = ["sh", "txt"])]
        ext: Vec<String>,
    },
}

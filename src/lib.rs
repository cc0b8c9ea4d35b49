// 库文件，导出模块
pub mod cli;
pub mod config;
pub mod exec;
pub mod ssh;
pub mod transfer;
pub mod utils;

pub use config::{ClientConfig, HostKeyPolicy, TunnelSpec};
pub use exec::{ExecutionResult, EXIT_STATUS_UNOBSERVED};
pub use ssh::{Credential, Endpoint, SshClient};
pub use utils::error::{ClientError, TransportError};

use anyhow::{bail, Context, Result};
use config::{Config, Operation};
use utils::file::expand_paths;

/// Process exit code for a command whose exit status never arrived.
pub const EXIT_CODE_UNOBSERVED: i32 = 255;

/// Process exit code when some, but not all, files were uploaded.
pub const EXIT_CODE_PARTIAL_UPLOAD: i32 = 2;

/// Process exit code when the client itself failed (config, connect, channel
/// errors), as opposed to a remote command exiting non-zero.
pub const EXIT_CODE_CLIENT_ERROR: i32 = 254;

/// Maps the outcome of `run` to the process exit code.
pub fn exit_code(outcome: &Result<i32>) -> i32 {
    match outcome {
        Ok(code) => *code,
        Err(_) => EXIT_CODE_CLIENT_ERROR,
    }
}

/// Runs the operation described by `config` and returns the process exit code.
pub fn run(config: Config) -> Result<i32> {
    let mut client = SshClient::new(config.client.clone());
    client.authenticate(config.credential.clone());

    if config.tunnel {
        client
            .connect_through_default_tunnel(&config.host)
            .with_context(|| format!("Could not reach {} through the gateway", config.host))?;
    } else {
        client
            .connect(&config.host)
            .with_context(|| format!("Could not connect to {}", config.host))?;
    }

    let code = match &config.operation {
        Operation::Exec { command } => {
            let result = client.execute(command)?;
            if result.observed() {
                result.exit_status
            } else {
                EXIT_CODE_UNOBSERVED
            }
        }
        Operation::Upload {
            remote_dir,
            paths,
            extensions,
        } => {
            let files = expand_paths(paths, extensions).context("Failed to list local files")?;
            if files.is_empty() {
                bail!("No files to upload");
            }
            if client.copy_files(&files, remote_dir)? {
                0
            } else {
                EXIT_CODE_PARTIAL_UPLOAD
            }
        }
    };

    client.close();
    Ok(code)
}

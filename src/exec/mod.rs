// 远程命令执行
pub mod cancel;

pub use cancel::CancelToken;

use crate::config::ClientConfig;
use crate::ssh::transport::{ExecChannel, TransportSession};
use crate::utils::error::{ClientError, Result};
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};

/// Exit status reported when the remote side never sent one.
pub const EXIT_STATUS_UNOBSERVED: i32 = -100;

/// Bytes read from a stream per call.
pub const READ_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_status: i32,
}

impl ExecutionResult {
    /// False when no real exit status was received.
    pub fn observed(&self) -> bool {
        self.exit_status != EXIT_STATUS_UNOBSERVED
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Receives command output as it arrives.
pub trait OutputSink {
    fn stdout(&mut self, chunk: &[u8]);
    fn stderr(&mut self, chunk: &[u8]);

    /// Called once the command is over, before `execute` returns.
    fn flush(&mut self) {}
}

/// Forwards output to the `log` facade: stdout at info, stderr at warn.
#[derive(Debug, Default)]
pub struct LogSink {
    stdout: Utf8Buffer,
    stderr: Utf8Buffer,
}

impl OutputSink for LogSink {
    fn stdout(&mut self, chunk: &[u8]) {
        let text = self.stdout.push(chunk);
        if !text.is_empty() {
            log::info!("\n{}", text);
        }
    }

    fn stderr(&mut self, chunk: &[u8]) {
        let text = self.stderr.push(chunk);
        if !text.is_empty() {
            log::warn!("\n{}", text);
        }
    }

    fn flush(&mut self) {
        let out = self.stdout.finish();
        if !out.is_empty() {
            log::info!("\n{}", out);
        }
        let err = self.stderr.finish();
        if !err.is_empty() {
            log::warn!("\n{}", err);
        }
    }
}

/// Decodes a byte stream that arrives in arbitrary chunks. A character cut in
/// half by a chunk boundary is held back until the rest of it arrives.
#[derive(Debug, Default)]
pub struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = incomplete_tail(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Whatever is still held back, decoded lossily.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of an unfinished multi-byte sequence at the end of `bytes`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Pause between polls when no output is pending.
    pub poll_interval: Duration,
    /// Unbounded when `None`.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

impl ExecOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.exec_timeout(),
            cancel: None,
        }
    }
}

/// Disconnects the channel however the operation ends.
struct ChannelGuard<C: ExecChannel>(C);

impl<C: ExecChannel> Deref for ChannelGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.0
    }
}

impl<C: ExecChannel> DerefMut for ChannelGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.0
    }
}

impl<C: ExecChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

/// Runs `command` on `session`, streaming its output into `sink` until the
/// remote side closes the channel.
///
/// A cancel on `options.cancel` only applies to this command: the token is
/// reset before returning, however the command ended.
pub fn execute<S: TransportSession + ?Sized>(
    session: &S,
    command: &str,
    options: &ExecOptions,
    sink: &mut dyn OutputSink,
) -> Result<ExecutionResult> {
    let result = session
        .open_exec(command)
        .map_err(|source| ClientError::Execution {
            command: command.to_string(),
            source,
        })
        .and_then(|channel| run_channel(channel, command, options, sink));

    if let Some(token) = &options.cancel {
        token.reset();
    }
    result
}

fn run_channel<C: ExecChannel>(
    channel: C,
    command: &str,
    options: &ExecOptions,
    sink: &mut dyn OutputSink,
) -> Result<ExecutionResult> {
    let result = poll_until_closed(ChannelGuard(channel), command, options, sink);
    sink.flush();
    result
}

fn poll_until_closed<C: ExecChannel>(
    mut channel: ChannelGuard<C>,
    command: &str,
    options: &ExecOptions,
    sink: &mut dyn OutputSink,
) -> Result<ExecutionResult> {
    let started = Instant::now();
    let mut buffer = [0u8; READ_CHUNK_SIZE];

    loop {
        drain(&mut *channel, &mut buffer, sink);

        if channel.is_closed() {
            // 关闭后再读一次剩余输出
            drain(&mut *channel, &mut buffer, sink);
            let status = channel.exit_status().map_err(|source| ClientError::Execution {
                command: command.to_string(),
                source,
            })?;
            let exit_status = status.unwrap_or(EXIT_STATUS_UNOBSERVED);
            log::info!("exit status: {}", exit_status);
            return Ok(ExecutionResult { exit_status });
        }

        let mut wait = options.poll_interval;
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ClientError::ExecutionTimedOut {
                    command: command.to_string(),
                });
            }
            wait = wait.min(timeout - elapsed);
        }

        let cancelled = match &options.cancel {
            Some(token) => token.sleep(wait),
            None => {
                thread::sleep(wait);
                false
            }
        };
        if cancelled {
            return Err(ClientError::ExecutionCancelled {
                command: command.to_string(),
            });
        }
    }
}

/// Moves everything currently buffered on both streams into `sink`. Read errors
/// end the pass without failing the command.
fn drain<C: ExecChannel + ?Sized>(channel: &mut C, buffer: &mut [u8], sink: &mut dyn OutputSink) {
    loop {
        match channel.read_stdout(buffer) {
            Ok(0) => break,
            Ok(n) => sink.stdout(&buffer[..n]),
            Err(e) => {
                log::warn!("Failed to read command output: {}", e);
                break;
            }
        }
    }
    loop {
        match channel.read_stderr(buffer) {
            Ok(0) => break,
            Ok(n) => sink.stderr(&buffer[..n]),
            Err(e) => {
                log::warn!("Failed to read command error output: {}", e);
                break;
            }
        }
    }
}

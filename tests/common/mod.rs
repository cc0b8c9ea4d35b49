// 测试用的记录型传输层
#![allow(dead_code)]

use ssh_ops::ssh::transport::{
    ConnectTarget, Credential, Endpoint, ExecChannel, SftpChannel, Transport, TransportSession,
};
use ssh_ops::exec::OutputSink;
use ssh_ops::{ClientConfig, SshClient, TransportError, TunnelSpec};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::io::{self, Read};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect {
        id: usize,
        address: Endpoint,
        host_key_name: Endpoint,
        user: String,
    },
    Forward {
        id: usize,
        local_port: u16,
        target: Endpoint,
    },
    OpenExec {
        id: usize,
        command: String,
    },
    OpenSftp {
        id: usize,
    },
    Disconnect {
        id: usize,
    },
    ExecDisconnect,
    Cd(String),
    Mkdir(String),
    Put(String),
    SftpDisconnect,
}

/// What a scripted command does: one output batch becomes readable per poll.
#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    pub batches: Vec<Vec<u8>>,
    pub stderr: Vec<u8>,
    pub exit: Option<i32>,
    pub never_closes: bool,
}

#[derive(Debug, Default)]
pub struct World {
    pub calls: Vec<Call>,
    pub next_id: usize,
    /// Hosts (as dialled) whose handshake fails.
    pub unreachable: HashSet<String>,
    pub fail_forward: bool,
    pub fail_exec_open: bool,
    pub fail_sftp_open: bool,
    /// Absolute remote directories that exist. "/" always does.
    pub remote_dirs: HashSet<String>,
    /// Absolute remote path and content of every uploaded file.
    pub uploaded: Vec<(String, Vec<u8>)>,
    pub script: ExecScript,
}

pub type Shared = Rc<RefCell<World>>;

#[derive(Clone, Default)]
pub struct MockTransport {
    pub world: Shared,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.world.borrow().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Connect { .. }))
            .count()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }
}

impl Transport for MockTransport {
    type Session = MockSession;

    fn connect(&self, target: &ConnectTarget, credential: &Credential) -> Result<MockSession, TransportError> {
        let mut world = self.world.borrow_mut();
        world.next_id += 1;
        let id = world.next_id;
        world.calls.push(Call::Connect {
            id,
            address: target.address.clone(),
            host_key_name: target.host_key_name.clone(),
            user: credential.user().to_string(),
        });
        if world.unreachable.contains(&target.address.host) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(MockSession {
            id,
            world: self.world.clone(),
        })
    }
}

pub struct MockSession {
    pub id: usize,
    world: Shared,
}

impl TransportSession for MockSession {
    type Exec = MockExec;
    type Sftp = MockSftp;

    fn open_exec(&self, command: &str) -> Result<MockExec, TransportError> {
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::OpenExec {
            id: self.id,
            command: command.to_string(),
        });
        if world.fail_exec_open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel refused").into());
        }
        let script = world.script.clone();
        let mut batches: VecDeque<Vec<u8>> = script.batches.into();
        let available = batches.pop_front().unwrap_or_default().into();
        Ok(MockExec {
            world: self.world.clone(),
            batches,
            available,
            stderr: script.stderr.into(),
            exit: script.exit,
            never_closes: script.never_closes,
            open: true,
        })
    }

    fn open_sftp(&self) -> Result<MockSftp, TransportError> {
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::OpenSftp { id: self.id });
        if world.fail_sftp_open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "subsystem refused").into());
        }
        Ok(MockSftp {
            world: self.world.clone(),
            cwd: "/".to_string(),
        })
    }

    fn forward_local(&mut self, local_port: u16, target: &Endpoint) -> Result<(), TransportError> {
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::Forward {
            id: self.id,
            local_port,
            target: target.clone(),
        });
        if world.fail_forward {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken").into());
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.world.borrow_mut().calls.push(Call::Disconnect { id: self.id });
    }
}

pub struct MockExec {
    world: Shared,
    batches: VecDeque<Vec<u8>>,
    available: VecDeque<u8>,
    stderr: VecDeque<u8>,
    exit: Option<i32>,
    never_closes: bool,
    open: bool,
}

fn take_into(source: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = buf.len().min(source.len());
    for (slot, byte) in buf.iter_mut().zip(source.drain(..n)) {
        *slot = byte;
    }
    n
}

impl ExecChannel for MockExec {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(take_into(&mut self.available, buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(take_into(&mut self.stderr, buf))
    }

    fn is_closed(&mut self) -> bool {
        match self.batches.pop_front() {
            Some(batch) => {
                self.available.extend(batch);
                false
            }
            None => !self.never_closes,
        }
    }

    fn exit_status(&mut self) -> Result<Option<i32>, TransportError> {
        Ok(self.exit)
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.world.borrow_mut().calls.push(Call::ExecDisconnect);
        }
    }
}

pub struct MockSftp {
    world: Shared,
    cwd: String,
}

impl MockSftp {
    fn child(&self, name: &str) -> String {
        if self.cwd == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.cwd, name)
        }
    }
}

impl SftpChannel for MockSftp {
    fn cd(&mut self, dir: &str) -> Result<(), TransportError> {
        let target = if dir == "/" { "/".to_string() } else { self.child(dir) };
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::Cd(dir.to_string()));
        if target == "/" || world.remote_dirs.contains(&target) {
            self.cwd = target;
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file").into())
        }
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), TransportError> {
        let target = self.child(dir);
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::Mkdir(dir.to_string()));
        world.remote_dirs.insert(target);
        Ok(())
    }

    fn put(&mut self, source: &mut dyn Read, name: &str) -> Result<u64, TransportError> {
        let mut content = Vec::new();
        source.read_to_end(&mut content)?;
        let path = self.child(name);
        let mut world = self.world.borrow_mut();
        world.calls.push(Call::Put(name.to_string()));
        let len = content.len() as u64;
        world.uploaded.push((path, content));
        Ok(len)
    }

    fn disconnect(&mut self) {
        self.world.borrow_mut().calls.push(Call::SftpDisconnect);
    }
}

/// Collects command output for assertions.
#[derive(Clone, Default)]
pub struct Captured {
    pub stdout: Rc<RefCell<Vec<u8>>>,
    pub stderr: Rc<RefCell<Vec<u8>>>,
}

impl OutputSink for Captured {
    fn stdout(&mut self, chunk: &[u8]) {
        self.stdout.borrow_mut().extend_from_slice(chunk);
    }

    fn stderr(&mut self, chunk: &[u8]) {
        self.stderr.borrow_mut().extend_from_slice(chunk);
    }
}

pub fn gateway() -> TunnelSpec {
    TunnelSpec::new("jump.example.org", "ops", "gateway-secret")
}

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        poll_interval_millis: 1,
        gateway: Some(gateway()),
        ..ClientConfig::default()
    }
}

/// Client over a fresh mock transport, plus the transport to inspect it.
pub fn client() -> (SshClient<MockTransport>, MockTransport, Captured) {
    let transport = MockTransport::new();
    let mut client = SshClient::with_transport(transport.clone(), fast_config());
    let captured = Captured::default();
    client.set_output_sink(Box::new(captured.clone()));
    (client, transport, captured)
}

// 本地端口转发
use crate::ssh::transport::Endpoint;
use crate::utils::error::TransportError;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use ssh2::Session;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_IDLE: Duration = Duration::from_millis(50);
const PUMP_IDLE: Duration = Duration::from_millis(5);
const BUFFER_SIZE: usize = 32 * 1024;

/// Listens on `127.0.0.1:<local_port>` and relays every accepted connection to
/// `target` through a direct-tcpip channel on the gateway session.
///
/// The gateway session is switched to non-blocking mode by the relay thread, so
/// nothing else may use it while the forward is running.
pub struct LocalForward {
    local_port: u16,
    // 丢弃发送端即通知线程退出
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LocalForward {
    /// Port 0 picks a free port, `local_port` reports which.
    pub fn start(session: Session, local_port: u16, target: Endpoint) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", local_port))?;
        listener.set_nonblocking(true)?;
        let local_port = listener.local_addr()?.port();

        let (shutdown, shutdown_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("forward-{}", local_port))
            .spawn(move || serve(listener, session, target, shutdown_rx))?;

        log::debug!("Forwarding 127.0.0.1:{} through the gateway", local_port);
        Ok(Self {
            local_port,
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the relay thread and waits for it. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Forwarder thread for port {} panicked", self.local_port);
            }
        }
    }
}

impl Drop for LocalForward {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_requested(shutdown: &Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

fn serve(listener: TcpListener, session: Session, target: Endpoint, shutdown: Receiver<()>) {
    while !stop_requested(&shutdown) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("Forward connection from {} to {}", peer, target);
                if let Err(e) = relay(&session, stream, &target, &shutdown) {
                    log::warn!("Forward to {} failed: {}", target, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_IDLE),
            Err(e) => {
                log::warn!("Forward listener stopped: {}", e);
                return;
            }
        }
    }
}

fn relay(
    session: &Session,
    mut stream: TcpStream,
    target: &Endpoint,
    shutdown: &Receiver<()>,
) -> Result<(), TransportError> {
    session.set_blocking(true);
    let mut channel = session.channel_direct_tcpip(&target.host, target.port, None)?;
    stream.set_nonblocking(true)?;
    session.set_blocking(false);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let result = loop {
        if stop_requested(shutdown) {
            break Ok(());
        }
        let mut progressed = false;

        // 本地 -> 远端
        match stream.read(&mut buffer) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(e) = write_all_retrying(&mut channel, &buffer[..n], shutdown) {
                    break Err(e);
                }
                progressed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => break Err(e),
        }

        // 远端 -> 本地
        match channel.read(&mut buffer) {
            Ok(0) if channel.eof() => break Ok(()),
            Ok(0) => {}
            Ok(n) => {
                if let Err(e) = write_all_retrying(&mut stream, &buffer[..n], shutdown) {
                    break Err(e);
                }
                progressed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => break Err(e),
        }

        if !progressed {
            thread::sleep(PUMP_IDLE);
        }
    };

    session.set_blocking(true);
    let _ = channel.close();
    result.map_err(TransportError::from)
}

fn write_all_retrying<W: Write>(writer: &mut W, mut data: &[u8], shutdown: &Receiver<()>) -> io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "forward peer closed")),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if stop_requested(shutdown) {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "forward stopped"));
                }
                thread::sleep(PUMP_IDLE);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

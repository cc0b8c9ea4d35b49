// 取消令牌
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Cancels a running `execute_command` from another thread. Clones share state.
/// A cancel stays in effect until `reset`, which the executor does when the
/// command it was aimed at returns.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Clears a pending cancel so the token can serve the next command.
    pub fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Sleeps for `duration`, waking early on cancellation. Returns true if the
    /// token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.rx.recv_timeout(duration) {
            Ok(()) => {
                // 放回信号，保持已取消状态
                self.cancel();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

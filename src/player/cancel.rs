//! Interruptible sleeping for the player.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::PlayError;

/// Create a connected canceller and token.
///
/// The canceller can be moved to another thread, e.g. a Ctrl-C handler.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(1);
    let flag = Arc::new(AtomicBool::new(false));
    let canceller = Canceller {
        tx,
        flag: Arc::clone(&flag),
    };
    let token = CancelToken {
        rx,
        flag,
        _keepalive: None,
    };
    (canceller, token)
}

#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Sender<()>,
    flag: Arc<AtomicBool>,
}

impl Canceller {
    /// Stop playback. Wakes a sleeping player immediately.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // A full channel already holds a wakeup.
        let _ = self.tx.try_send(());
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
    flag: Arc<AtomicBool>,
    _keepalive: Option<Sender<()>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            rx,
            flag: Arc::new(AtomicBool::new(false)),
            _keepalive: Some(tx),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Block for `duration` or until cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), PlayError> {
        if self.is_cancelled() {
            return Err(PlayError::Cancelled);
        }

        match self.rx.recv_timeout(duration) {
            Ok(()) => Err(PlayError::Cancelled),
            Err(RecvTimeoutError::Timeout) if self.is_cancelled() => Err(PlayError::Cancelled),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                // Every canceller is gone, nothing can interrupt us anymore.
                if self.is_cancelled() {
                    return Err(PlayError::Cancelled);
                }
                thread::sleep(duration);
                Ok(())
            }
        }
    }
}

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Run-wide stop signal shared by every batch worker.
///
/// Nothing is ever sent on the channel: triggering drops the only sender, which
/// disconnects every receiver at once and wakes up any pending [`Shutdown::sleep`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx_stop: Arc<Mutex<Option<Sender<()>>>>,
    rx_stop: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx_stop, rx_stop) = crossbeam_channel::bounded::<()>(0);
        Self {
            tx_stop: Arc::new(Mutex::new(Some(tx_stop))),
            rx_stop,
        }
    }

    pub fn trigger(&self) {
        self.tx_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.rx_stop.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks for `delay`, returns `false` if interrupted by a trigger.
    pub fn sleep(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_triggered();
        }
        matches!(
            self.rx_stop.recv_timeout(delay),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rkboot_bootstrap::signals::{wait_for_os_signal, Signal};
use tokio::sync::mpsc;

use crate::guard::panic_message;

/// A named callback run once when shutdown begins, before any entry is interrupted.
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

const SIGNAL_CAPACITY: usize = 4;

/// Cloneable sender side of the shutdown channel, handed to entries and endpoints.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<Signal>,
}

impl ShutdownHandle {
    /// Request a graceful shutdown. Returns `false` when a request is already pending
    /// or nobody is waiting anymore.
    pub fn trigger(&self, sig: Signal) -> bool {
        self.tx.try_send(sig).is_ok()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Receiving side: waits for the first OS signal or in-process request, and owns the
/// shutdown hooks.
pub struct ShutdownController {
    tx: mpsc::Sender<Signal>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Signal>>,
    hooks: parking_lot::Mutex<Vec<(String, ShutdownHook)>>,
    os_signals: bool,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(SIGNAL_CAPACITY);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            hooks: parking_lot::Mutex::new(Vec::new()),
            os_signals: true,
        }
    }

    /// Disable OS signal listening; only [`ShutdownHandle::trigger`] ends the wait.
    pub fn without_os_signals(mut self) -> Self {
        self.os_signals = false;
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    /// Register a hook under `name`; a later hook with the same name replaces it.
    pub fn add_hook<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let hook: ShutdownHook = Arc::new(hook);
        let mut hooks = self.hooks.lock();
        match hooks.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = hook,
            None => hooks.push((name, hook)),
        }
    }

    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Run every hook once, in registration order. The list is snapshotted first so a
    /// hook may register further hooks without deadlocking.
    ///
    /// A panicking hook is logged and skipped; the remaining hooks still run. Returns the
    /// number of hooks that panicked.
    pub fn run_hooks(&self) -> usize {
        let snapshot: Vec<(String, ShutdownHook)> = self.hooks.lock().clone();
        let mut failed = 0;
        for (name, hook) in snapshot {
            tracing::debug!(hook = %name, "running shutdown hook");
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook())) {
                failed += 1;
                tracing::warn!(hook = %name, panic = %panic_message(payload.as_ref()), "shutdown hook panicked; continuing");
            }
        }
        failed
    }

    /// Block until the first termination signal arrives.
    ///
    /// OS handlers are installed on the first call. If they cannot be installed the
    /// wait degrades to in-process requests only.
    pub async fn wait(&self) -> Signal {
        let mut rx = self.rx.lock().await;

        let os = async {
            if !self.os_signals {
                return std::future::pending::<Signal>().await;
            }
            match wait_for_os_signal().await {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!(error = %e, "OS signal handlers unavailable; waiting for in-process requests only");
                    std::future::pending::<Signal>().await
                }
            }
        };

        tokio::select! {
            // the controller holds a sender, so the channel never closes while we wait
            sig = rx.recv() => sig.unwrap_or_else(|| Signal::Requested("closed".to_string())),
            sig = os => sig,
        }
    }
}

impl fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownController")
            .field("hooks", &self.hook_names())
            .field("os_signals", &self.os_signals)
            .finish()
    }
}

use anyhow::Result;
use std::fmt;
use tokio::signal;

/// A reason for leaving the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
    /// Raised in-process, e.g. by a shutdown endpoint. Carries who asked.
    Requested(String),
}

impl Signal {
    pub fn name(&self) -> &str {
        match self {
            Signal::Hangup => "SIGHUP",
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Requested(_) => "REQUESTED",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Requested(by) => write!(f, "REQUESTED({by})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Wait for the first termination signal: SIGHUP, SIGINT, SIGTERM, SIGQUIT or Ctrl+C.
///
/// SIGKILL is not part of the set; it cannot be intercepted and tokio refuses to
/// register a handler for it.
#[cfg(unix)]
pub async fn wait_for_os_signal() -> Result<Signal> {
    use signal::unix::{signal as unix_signal, SignalKind};

    let mut hup = unix_signal(SignalKind::hangup()).inspect_err(|e| {
        tracing::error!(%e, "Failed to install SIGHUP handler");
    })?;
    let mut int = unix_signal(SignalKind::interrupt()).inspect_err(|e| {
        tracing::error!(%e, "Failed to install SIGINT handler");
    })?;
    let mut term = unix_signal(SignalKind::terminate()).inspect_err(|e| {
        tracing::error!(%e, "Failed to install SIGTERM handler");
    })?;
    let mut quit = unix_signal(SignalKind::quit()).inspect_err(|e| {
        tracing::error!(%e, "Failed to install SIGQUIT handler");
    })?;

    let sig = tokio::select! {
        _ = hup.recv() => Signal::Hangup,
        _ = int.recv() => Signal::Interrupt,
        _ = term.recv() => Signal::Terminate,
        _ = quit.recv() => Signal::Quit,
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(%e, "Error handling Ctrl+C signal");
                return Err(e.into());
            }
            Signal::Interrupt
        }
    };

    tracing::info!(signal = %sig, "Received shutdown signal");
    Ok(sig)
}

#[cfg(not(unix))]
pub async fn wait_for_os_signal() -> Result<Signal> {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(%e, "Failed to install Ctrl+C handler");
        return Err(e.into());
    }
    tracing::info!("Received Ctrl+C signal");
    Ok(Signal::Interrupt)
}

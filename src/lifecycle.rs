//! Process lifecycle: OS signals, the internal shutdown signal and bounded drains.
//!
//! Every component that must stop on termination watches a single
//! [`Shutdown`]. OS signals and internal fatal conditions both end up calling
//! [`Shutdown::trigger`], so there is exactly one path into draining.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::ShutdownError;

/// Cloneable, one-way shutdown flag.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Shutdown { tx: Arc::new(tx) }
    }

    /// Starts shutdown. Returns `true` for the call that actually flipped the flag.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once shutdown has been triggered, immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Quit => "SIGQUIT",
        })
    }
}

/// Installed handlers for interrupt, terminate and quit.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Registers the handlers. Must be called from within a tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(TerminationSignals {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                quit: signal(SignalKind::quit())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(TerminationSignals {})
        }
    }

    /// Waits for the next termination signal.
    pub async fn recv(&mut self) -> io::Result<TerminationSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Ok(TerminationSignal::Interrupt),
                _ = self.terminate.recv() => Ok(TerminationSignal::Terminate),
                _ = self.quit.recv() => Ok(TerminationSignal::Quit),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok(TerminationSignal::Interrupt)
        }
    }
}

/// Forwards the first termination signal into `shutdown`.
///
/// The listener exits quietly if shutdown is triggered some other way first.
pub fn spawn_signal_listener(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::install()?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            received = signals.recv() => {
                match received {
                    Ok(signal) => info!(%signal, "termination signal received, starting graceful shutdown"),
                    Err(err) => info!(error = %err, "signal stream failed, starting graceful shutdown"),
                }
                shutdown.trigger();
            }
            _ = shutdown.wait() => debug!("shutdown triggered internally, signal listener exiting"),
        }
    }))
}

/// Awaits `work` for at most `grace`.
pub async fn drain<F>(what: &'static str, work: F, grace: Duration) -> Result<F::Output, ShutdownError>
where
    F: Future,
{
    tokio::time::timeout(grace, work)
        .await
        .map_err(|_| ShutdownError::Timeout { what, grace })
}

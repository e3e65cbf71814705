//! Termination signal handling
//!
//! Handlers are installed up front with [`ShutdownSignal::install`] so a
//! signal that arrives while the agent is still registering is not lost.

use crate::error::{Error, Result};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Pending SIGINT/SIGTERM notification
#[cfg(unix)]
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    /// Install SIGTERM and SIGINT handlers
    ///
    /// Must be called from within a tokio runtime.
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::Other(format!("Failed to setup SIGTERM handler: {e}")))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::Other(format!("Failed to setup SIGINT handler: {e}")))?;

        Ok(Self { sigterm, sigint })
    }

    /// Wait for either signal
    ///
    /// # Returns
    ///
    /// The name of the signal received
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Pending Ctrl-C notification
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
pub struct ShutdownSignal {
    _private: (),
}

#[cfg(not(unix))]
impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        Ok(Self { _private: () })
    }

    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }
}

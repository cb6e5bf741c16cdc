//! Graceful shutdown on SIGTERM and SIGINT.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Watches for shutdown signals in a background task and cancels a token when one
/// arrives.
pub struct SigDown {
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Registers the signal handlers. Fails only if signal registration fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let cancellation_token = CancellationToken::new();
        let trigger = cancellation_token.clone();
        tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = received, "Shutdown signal received");
            trigger.cancel();
        });
        Ok(Self { cancellation_token })
    }

    /// Token to distribute to subsystems that should stop on shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

//! Process shutdown wiring.
//!
//! SIGINT and SIGTERM resolve into one cancellation token that every
//! worker watches. Shutdown is cooperative: the scheduler returns at the
//! next block boundary, consumption stops at the next delivery, and
//! whatever was in flight stays unacked for the queue cleaner to
//! reclaim.

use std::io;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Arms the signal handlers and returns the token workers watch.
///
/// The listener task lives for the rest of the process; the first signal
/// cancels the token, repeats are ignored.
pub fn shutdown_token() -> io::Result<CancellationToken> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let token = CancellationToken::new();
    let armed = token.clone();
    tokio::spawn(async move {
        let caught = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        tracing::info!(signal = caught, "received signal to stop");
        armed.cancel();
    });
    Ok(token)
}

//! Process interrupt wiring.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancel `cancel` when the process receives ctrl-c.
///
/// The listener ends on its own once `cancel` is cancelled by anyone else.
pub fn install(cancel: CancellationToken) -> JoinHandle<()> {
  tokio::spawn(async move {
    tokio::select! {
      signal = tokio::signal::ctrl_c() => match signal {
        Ok(()) => {
          warn!("interrupt_received");
          cancel.cancel();
        }
        Err(e) => error!(error = %e, "failed to listen for interrupt"),
      },
      _ = cancel.cancelled() => {}
    }
  })
}

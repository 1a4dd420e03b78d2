//! Interaction chains: recording, persisting and replaying HTTP exchanges.

pub mod config;
pub mod format;
pub mod recorder;
pub mod replayer;
pub mod step;

use crate::errors::Result;

/// Runs a stop action when dropped, so a scoped session is torn down even
/// if the body panics.
struct StopGuard<F: FnMut() -> Result<()>> {
    stop: Option<F>,
}

impl<F: FnMut() -> Result<()>> StopGuard<F> {
    fn new(stop: F) -> Self {
        Self { stop: Some(stop) }
    }

    fn finish(mut self) -> Result<()> {
        self.stop.take().map_or(Ok(()), |mut stop| stop())
    }
}

impl<F: FnMut() -> Result<()>> Drop for StopGuard<F> {
    fn drop(&mut self) {
        if let Some(mut stop) = self.stop.take() {
            if let Err(err) = stop() {
                log::warn!("failed to stop session while unwinding: {err}");
            }
        }
    }
}

//! Cooperative batch cancellation.

use crate::model::{LogEvent, OrchestratorEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

pub(crate) const CANCEL_MESSAGE: &str = "Cancelling remaining scenarios.";

/// Cancellation flag of one batch. Once set it is never cleared.
#[derive(Debug, Default)]
pub(crate) struct CancellationController {
    requested: bool,
}

impl CancellationController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested
    }

    /// Set the flag and announce it. Returns `false` when it was already set,
    /// in which case nothing is emitted.
    ///
    /// The running process is left alone; the queue drains at its completion.
    pub(crate) fn cancel_all(&mut self, event_tx: &UnboundedSender<OrchestratorEvent>) -> bool {
        if self.requested {
            return false;
        }
        self.requested = true;
        info!("batch cancellation requested");
        let _ = event_tx.send(OrchestratorEvent::Log(LogEvent::ui_event(CANCEL_MESSAGE)));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogLevel;
    use tokio::sync::mpsc;

    #[test]
    fn second_cancel_is_a_no_op() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cancel = CancellationController::new();
        assert!(!cancel.is_requested());
        assert!(cancel.cancel_all(&tx));
        assert!(!cancel.cancel_all(&tx));
        assert!(cancel.is_requested());

        match rx.try_recv() {
            Ok(OrchestratorEvent::Log(ev)) => {
                assert_eq!(ev.level, LogLevel::UiEvent);
                assert_eq!(ev.message, CANCEL_MESSAGE);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}

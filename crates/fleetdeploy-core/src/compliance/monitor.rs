//! Live data-access monitoring.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::ComplianceError;
use crate::types::DataAccessEvent;

/// Handle to a running monitor. Delivery stops on [`Self::cancel`] or drop.
#[derive(Debug)]
pub struct DataAccessSubscription {
    handle: JoinHandle<()>,
}

impl DataAccessSubscription {
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for DataAccessSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Deliver events from `receiver` to `on_event` on a background task.
pub fn spawn<F>(
    mut receiver: broadcast::Receiver<DataAccessEvent>,
    on_event: F,
) -> Result<DataAccessSubscription, ComplianceError>
where
    F: Fn(DataAccessEvent) + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        ComplianceError::DataAccessMonitoringFailed(format!("no async runtime available: {}", e))
    })?;

    let handle = runtime.spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "data access monitor fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    Ok(DataAccessSubscription { handle })
}

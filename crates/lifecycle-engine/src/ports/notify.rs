use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::EngineResult;

/// Downstream collaborator told about automatic transitions.
#[async_trait]
pub trait BackendNotifier: Send + Sync {
    async fn notify_lifecycle_changed(&self, ids: &[String]) -> EngineResult<()>;
}

/// Logs notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl BackendNotifier for TracingNotifier {
    async fn notify_lifecycle_changed(&self, ids: &[String]) -> EngineResult<()> {
        info!(ids = ?ids, "Lifecycle changed, backend notified");
        Ok(())
    }
}

/// Keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BackendNotifier for RecordingNotifier {
    async fn notify_lifecycle_changed(&self, ids: &[String]) -> EngineResult<()> {
        self.calls.lock().push(ids.to_vec());
        Ok(())
    }
}

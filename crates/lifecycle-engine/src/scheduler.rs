//! Cron-driven timer for the trigger sweep.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};

/// A parsed cron schedule.
///
/// Accepts the classic five-field form (`*/5 * * * *`) as well as the six/seven-field form with
/// a leading seconds field. Five-field expressions fire at second `0`.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> EngineResult<Self> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| EngineError::Schedule {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Whatever the scheduler drives once per occurrence.
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn tick(&self, now: DateTime<Utc>);
}

/// Background task invoking a [`SweepTarget`] at every occurrence of a [`CronSchedule`].
///
/// One scheduler per process. Nothing coordinates schedulers across processes sharing the
/// same entity store.
pub struct SweepScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    pub fn spawn(
        target: Arc<dyn SweepTarget>,
        schedule: CronSchedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        info!(cron = %schedule.expression(), "Lifecycle trigger sweep scheduled");

        let handle = tokio::spawn(async move {
            let mut cursor = clock.now();
            loop {
                let base = clock.now().max(cursor);
                let Some(next) = schedule.next_after(base) else {
                    warn!(cron = %schedule.expression(), "Cron schedule has no further occurrences");
                    break;
                };
                let wait = (next - base).to_std().unwrap_or_default();

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                cursor = next;
                debug!(at = %next, "Lifecycle trigger sweep tick");
                target.tick(clock.now()).await;
                if let Some(following) = schedule.next_after(next) {
                    debug!(next = %following, "Next lifecycle trigger sweep");
                }
            }
            debug!("Lifecycle trigger scheduler stopped");
        });

        Self { cancel, handle }
    }

    /// Token cancelling the scheduler; cancelling it has the same effect as [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the scheduler and wait for an in-flight tick to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Lifecycle trigger scheduler task failed");
        }
    }
}

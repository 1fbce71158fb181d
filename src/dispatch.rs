use crate::dedupe::{Clock, DedupeCache};
use crate::ntfy::{build_alert, NtfyApi, Priority};
use crate::report::CspReport;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent(Priority),
    Suppressed,
    Failed,
}

/// Turns accepted violations into ntfy notifications, at most one per
/// directive/blocked-uri pair per TTL window.
pub struct Dispatcher {
    notifier: Arc<dyn NtfyApi>,
    clock: Arc<dyn Clock>,
    recent: Mutex<DedupeCache>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn NtfyApi>, clock: Arc<dyn Clock>, cache: DedupeCache) -> Self {
        Self {
            notifier,
            clock,
            recent: Mutex::new(cache),
        }
    }

    pub async fn dispatch(
        &self,
        directive: &str,
        blocked_uri: &str,
        report: &CspReport,
    ) -> DispatchOutcome {
        let key = DedupeCache::key(directive, blocked_uri);
        let now = self.clock.now_millis();
        {
            let mut recent = self.recent.lock().await;
            if !recent.admit(&key, now) {
                info!("Skipped duplicate alert for {}", key);
                return DispatchOutcome::Suppressed;
            }
            debug!(tracked = recent.len(), "Recorded alert for {}", key);
        }

        let alert = build_alert(directive, blocked_uri, report);
        match self.notifier.publish(&alert).await {
            Ok(()) => {
                info!(priority = %alert.priority, "Sent alert: {}", alert.title);
                DispatchOutcome::Sent(alert.priority)
            }
            Err(e) => {
                warn!("Failed to send CSP alert '{}': {:#}", alert.title, e);
                DispatchOutcome::Failed
            }
        }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.recent.lock().await.len()
    }
}

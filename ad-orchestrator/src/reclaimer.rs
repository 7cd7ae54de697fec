use crate::store::ArtifactStore;
use crate::types::{OrchestratorError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task that periodically sweeps expired artifacts out of a store.
pub struct Reclaimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reclaimer {
    /// Starts the sweep loop. Fails if the store already has a reclaimer.
    pub fn spawn(store: Arc<ArtifactStore>, every: Duration) -> Result<Self> {
        if every.is_zero() {
            return Err(OrchestratorError::Config(
                "reclaim interval must be greater than zero".to_string(),
            ));
        }
        if !store.claim_reclaimer() {
            return Err(OrchestratorError::General(
                "artifact store already has a reclaimer".to_string(),
            ));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!("Artifact reclaimer running every {:?}", every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Run cleanup
                        let report = store.sweep().await;
                        if report.reclaimed > 0 || report.failed > 0 {
                            info!(
                                "Reclaimed {} artifacts ({} retried, {} failed), {} remain",
                                report.reclaimed,
                                report.retried,
                                report.failed,
                                store.len()
                            );
                        } else {
                            debug!("Sweep found nothing to reclaim");
                        }
                    }
                }
            }
            info!("Artifact reclaimer stopped");
        });

        Ok(Self { cancel, handle })
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Reclaimer task ended abnormally: {}", e);
        }
    }
}

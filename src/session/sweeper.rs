//! Background expiry sweep for the session store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::session::store::SessionStore;

pub struct SessionSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Purge expired sessions on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            ttl_secs = self.store.ttl().as_secs(),
            "Session sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.store.len(), "Expired sessions purged");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use url::Url;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops() {
        let store = Arc::new(SessionStore::new(&SessionConfig {
            capacity: 10,
            ttl_secs: 5,
            sweep_interval_secs: 1,
            id_length: 16,
        }));
        store.create_session(&Url::parse("https://a.com").unwrap());

        let (tx, rx) = broadcast::channel(1);
        let sweeper = SessionSweeper::new(store.clone(), Duration::from_secs(1));
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

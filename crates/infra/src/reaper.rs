//! Periodic removal of events whose window has ended.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cascade::{CascadeDeletionCoordinator, SweepReport};
use crate::store::TicketingStore;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to stop and join a running reaper.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "expiry reaper task ended abnormally");
            }
        }
    }
}

/// Runs the expiry sweep once on start and then on a fixed interval.
///
/// A failing sweep is logged and retried on the next tick; it never stops the
/// loop.
pub struct ExpiryReaper<S> {
    coordinator: Arc<CascadeDeletionCoordinator<S>>,
    interval: Duration,
}

impl<S> ExpiryReaper<S>
where
    S: TicketingStore + 'static,
{
    pub fn new(coordinator: Arc<CascadeDeletionCoordinator<S>>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep against the current time. Returns `None` when the expired
    /// events could not be listed.
    pub async fn run_once(&self) -> Option<SweepReport> {
        match self.coordinator.delete_expired_events(Utc::now()).await {
            Ok(report) => {
                if report.events_removed > 0 {
                    info!(
                        events_removed = report.events_removed,
                        bookings_removed = report.bookings_removed,
                        "expired events removed"
                    );
                } else {
                    debug!("no expired events");
                }
                for failure in &report.failures {
                    warn!(
                        event_id = %failure.event_id,
                        error = %failure.error,
                        "expired event left for next run"
                    );
                }
                Some(report)
            }
            Err(err) => {
                error!(error = %err, "expiry sweep failed");
                None
            }
        }
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "expiry reaper started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    // The first tick completes immediately.
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }

            info!("expiry reaper stopped");
        });

        ReaperHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTicketingStore, StoreUnit};
    use chrono::Duration as ChronoDuration;
    use horizon_core::{EventId, UserId};
    use horizon_ticketing::{Category, Event, EventDetails, NewTicketClass, TicketType};

    async fn store_with_ended_event() -> (InMemoryTicketingStore, EventId) {
        let store = InMemoryTicketingStore::new();
        let now = Utc::now();
        let category = Category::new("Archive", now).unwrap();
        let mut event = Event::create(
            UserId::new(),
            &category,
            EventDetails {
                name: "Yesterday".to_string(),
                description: String::new(),
                location: "Old Hall".to_string(),
                image_url: String::new(),
                date: now.date_naive(),
                start_time: now + ChronoDuration::hours(1),
                end_time: now + ChronoDuration::hours(2),
                tickets: vec![NewTicketClass::new(TicketType::Regular, 5, 5)],
            },
            now,
        )
        .unwrap();
        event.start_time = now - ChronoDuration::hours(3);
        event.end_time = now - ChronoDuration::hours(1);

        let mut unit = store.begin().await.unwrap();
        unit.insert_category(&category).await.unwrap();
        unit.insert_event(&event).await.unwrap();
        unit.commit().await.unwrap();
        (store, event.id)
    }

    #[tokio::test]
    async fn run_once_reports_removed_events() {
        let (store, event_id) = store_with_ended_event().await;
        let reaper = ExpiryReaper::new(
            Arc::new(CascadeDeletionCoordinator::new(store.clone())),
            Duration::from_secs(3600),
        );

        let report = reaper.run_once().await.unwrap();
        assert_eq!(report.events_removed, 1);
        assert!(store.event(event_id).await.unwrap().is_none());
        assert_eq!(reaper.run_once().await.unwrap().expired_found, 0);
    }

    #[tokio::test]
    async fn spawned_reaper_sweeps_on_start_and_stops() {
        let (store, event_id) = store_with_ended_event().await;
        let handle = ExpiryReaper::new(
            Arc::new(CascadeDeletionCoordinator::new(store.clone())),
            Duration::from_secs(3600),
        )
        .spawn();

        for _ in 0..100 {
            if store.event(event_id).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.event(event_id).await.unwrap().is_none());
        handle.shutdown().await;
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let reaper = ExpiryReaper::new(
            Arc::new(CascadeDeletionCoordinator::new(InMemoryTicketingStore::new())),
            Duration::ZERO,
        );
        assert_eq!(reaper.interval(), MIN_INTERVAL);
    }
}

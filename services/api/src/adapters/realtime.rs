//! services/api/src/adapters/realtime.rs
//!
//! In-process implementation of the `ChangeFeed` port. Every published event
//! goes through one tokio broadcast channel; each subscription runs a small
//! task that filters by table and hands matching events to its callback.

use sop_compliance_core::domain::{ChangeEvent, Table};
use sop_compliance_core::ports::{ChangeCallback, ChangeFeed, Subscription};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BroadcastChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastChangeFeed {
    /// `capacity` is the number of events a slow subscriber may fall behind by.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ChangeFeed for BroadcastChangeFeed {
    fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error; nobody is listening yet.
        if self.tx.send(event).is_err() {
            debug!("Change event dropped, no subscribers");
        }
    }

    /// Must be called from within a tokio runtime.
    fn subscribe(&self, table: Table, callback: ChangeCallback) -> Subscription {
        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) if event.table == table => callback(event),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(?table, skipped, "Change subscriber lagged, events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(?table, "Change subscription closed");
        });

        Subscription::new(move || token.cancel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_compliance_core::domain::ChangeKind;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn event(table: Table) -> ChangeEvent {
        ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            company_id: Uuid::new_v4(),
            record_id: Uuid::new_v4(),
            user_id: None,
            managers_only: false,
        }
    }

    async fn wait_for_receivers(feed: &BroadcastChangeFeed, n: usize) {
        for _ in 0..100 {
            if feed.subscriber_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_subscriber_only_sees_its_table() {
        let feed = BroadcastChangeFeed::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = feed.subscribe(
            Table::Acknowledgments,
            Box::new(move |e: ChangeEvent| {
                let _ = tx.send(e);
            }),
        );

        let wanted = event(Table::Acknowledgments);
        feed.publish(event(Table::Notifications));
        feed.publish(wanted.clone());

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(got, wanted);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let feed = BroadcastChangeFeed::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = feed.subscribe(
            Table::Sops,
            Box::new(move |e: ChangeEvent| {
                let _ = tx.send(e);
            }),
        );
        sub.unsubscribe();
        wait_for_receivers(&feed, 0).await;
        assert_eq!(feed.subscriber_count(), 0);

        feed.publish(event(Table::Sops));
        // The callback, and with it the sender, is gone once the task exits.
        assert!(rx.recv().await.is_none());
    }
}

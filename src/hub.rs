use crate::snapshot::Snapshot;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Fans each snapshot out to every subscriber and keeps the latest one for
/// pull-style readers.
pub struct SnapshotHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Arc<Snapshot>>>>,
    latest: watch::Sender<Option<Arc<Snapshot>>>,
}

pub struct SnapshotSubscription {
    rx: mpsc::UnboundedReceiver<Arc<Snapshot>>,
}

impl SnapshotSubscription {
    /// `None` once the hub is gone and everything queued has been read.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }
}

impl SnapshotHub {
    pub fn new() -> Arc<Self> {
        let (latest, _) = watch::channel(None);
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            latest,
        })
    }

    pub fn subscribe(&self) -> SnapshotSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_subscribers().push(tx);
        SnapshotSubscription { rx }
    }

    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        self.latest.send_replace(Some(snapshot.clone()));

        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        let pruned = before - subscribers.len();
        if pruned > 0 {
            debug!(pruned, "удалены закрытые подписки на снимки");
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Arc<Snapshot>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

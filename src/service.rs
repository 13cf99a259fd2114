use crate::collector::Collector;
use crate::collectors::SystemSource;
use crate::hub::SnapshotHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Running sampling loop. Dropping the handle also stops the loop.
pub struct CollectorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Waits for the pass in progress (if any), then for teardown. Calling it
    /// again is a no-op.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(err) = task.await {
            error!(error = %err, "цикл сбора метрик завершился с ошибкой");
        }
    }
}

pub fn spawn<S: SystemSource>(
    collector: Collector<S>,
    interval: Duration,
    hub: Arc<SnapshotHub>,
) -> CollectorHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run(collector, interval, hub, shutdown_rx));
    CollectorHandle {
        shutdown,
        task: Some(task),
    }
}

async fn run<S: SystemSource>(
    collector: Collector<S>,
    interval: Duration,
    hub: Arc<SnapshotHub>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut slot = Some(collector);

    info!(interval_ms = interval.as_millis() as u64, "цикл сбора метрик запущен");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("получен сигнал остановки цикла сбора");
                break;
            }
            _ = ticker.tick() => {
                let Some(mut collector) = slot.take() else {
                    break;
                };
                let pass = tokio::task::spawn_blocking(move || {
                    let snapshot = collector.sample();
                    (collector, snapshot)
                })
                .await;

                match pass {
                    Ok((collector, snapshot)) => {
                        slot = Some(collector);
                        hub.publish(Arc::new(snapshot));
                    }
                    Err(err) => {
                        error!(error = %err, "проход сбора метрик аварийно завершился, цикл остановлен");
                        break;
                    }
                }
            }
        }
    }

    if let Some(mut collector) = slot {
        collector.teardown();
    }
}

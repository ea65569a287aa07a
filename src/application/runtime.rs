use super::escrow::ExpirySignalHandler;
use super::lifecycle::LifecycleService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Background tasks driving the automatic part of the lifecycle.
///
/// Each periodic job runs on its own interval; a failing run is logged and the
/// next tick runs as scheduled.
pub struct LifecycleRuntime {
    handles: Vec<JoinHandle<()>>,
}

impl LifecycleRuntime {
    /// Spawns the expiry listener plus the escrow sweep, queue drain, retry and
    /// settlement loops.
    pub fn start(
        service: Arc<LifecycleService>,
        expiry_signals: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let config = service.config().clone();
        info!(
            escrow_sweep_secs = config.escrow_sweep_interval.as_secs(),
            retry_secs = config.retry_interval.as_secs(),
            settlement_secs = config.settlement_interval.as_secs(),
            max_retries = config.max_retries,
            "Starting lifecycle runtime"
        );

        let listener = ExpirySignalHandler::new(expiry_signals);
        let mut handles = vec![tokio::spawn(listener.run(service.coordinator().clone()))];

        let svc = service.clone();
        handles.push(spawn_periodic("escrow_sweep", config.escrow_sweep_interval, move || {
            let svc = svc.clone();
            async move {
                let sweep = svc.escrow_sweep();
                svc.coordinator().drain(&sweep).await.map(|_| ())
            }
        }));

        let svc = service.clone();
        handles.push(spawn_periodic("queue_drain", config.queue_drain_interval, move || {
            let svc = svc.clone();
            async move {
                let worker = svc.queue_worker();
                svc.coordinator().drain(&worker).await.map(|_| ())
            }
        }));

        let svc = service.clone();
        handles.push(spawn_periodic("retry", config.retry_interval, move || {
            let svc = svc.clone();
            async move { svc.retry_engine().run_once().await.map(|_| ()) }
        }));

        let svc = service;
        handles.push(spawn_periodic("settlement", config.settlement_interval, move || {
            let svc = svc.clone();
            async move { svc.settlement_sweep().run_once().await.map(|_| ()) }
        }));

        Self { handles }
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Stops every task. A batch in flight is dropped at its next await point.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        info!("Lifecycle runtime stopped");
    }
}

fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; jobs start one period after boot.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = job().await {
                error!(job = name, error = %e, "Scheduled job failed");
            }
        }
    })
}

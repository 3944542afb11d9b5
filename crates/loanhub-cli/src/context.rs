//! Wires stores, services and the in-process worker for one CLI run.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use loanhub_core::config::AppConfig;
use loanhub_core::result::AppResult;
use loanhub_core::traits::SystemClock;
use loanhub_database::{DatabasePool, LoanStore, PgLoanStore};
use loanhub_service::notification::{build_transport, mail_breaker, mail_retry};
use loanhub_service::{NotificationDispatcher, ReservationService, WaitlistService};
use loanhub_worker::jobs::WaitlistNotifyHandler;
use loanhub_worker::{TaskExecutor, TaskQueue, WorkerRunner};

/// Services backed by PostgreSQL plus a worker draining post-commit tasks.
pub struct AppContext {
    pub reservations: ReservationService,
    pub waitlist: Arc<WaitlistService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pool: DatabasePool,
    queue: TaskQueue,
    worker: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AppContext {
    /// Connect to the database and start the worker.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        if let Some(gap) = config.shutdown_grace_shortfall() {
            tracing::warn!(
                grace_seconds = config.worker.shutdown_grace_seconds,
                worst_case_ms = config.notification.worst_case_latency().as_millis() as u64,
                shortfall_ms = gap.as_millis() as u64,
                "Worker shutdown grace is shorter than one notification at its worst case"
            );
        }

        let pool = DatabasePool::connect(&config.database).await?;
        let store: Arc<dyn LoanStore> = Arc::new(PgLoanStore::new(pool.pool().clone()));
        let clock = Arc::new(SystemClock);

        let waitlist = Arc::new(WaitlistService::new(Arc::clone(&store), clock.clone()));
        let transport = build_transport(&config.mail, config.notification.attempt_timeout())?;
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&waitlist),
            Arc::clone(&store),
            transport,
            mail_breaker(&config.notification),
            mail_retry(&config.notification),
            config.notification.attempt_timeout(),
        ));

        let (queue, receiver) = TaskQueue::bounded(config.worker.queue_capacity);
        let reservations = ReservationService::new(
            Arc::clone(&store),
            Arc::new(queue.clone()),
            clock,
            config.reservation.clone(),
        );

        let mut executor = TaskExecutor::new();
        executor.register(Arc::new(WaitlistNotifyHandler::new(Arc::clone(&dispatcher))));
        let runner = WorkerRunner::new(
            Arc::new(executor),
            config.worker.clone(),
            format!("loanhub-cli-{}", std::process::id()),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(async move { runner.run(receiver, shutdown_rx).await });

        Ok(Self {
            reservations,
            waitlist,
            dispatcher,
            pool,
            queue,
            worker,
            shutdown,
        })
    }

    /// Close the task queue, wait for queued tasks, then close the pool.
    ///
    /// Ctrl-C stops the worker early; it then only waits out the
    /// configured grace period.
    pub async fn finish(self) {
        let Self {
            reservations,
            pool,
            queue,
            mut worker,
            shutdown,
            ..
        } = self;

        if queue.depth() > 0 {
            tracing::info!(pending = queue.depth(), "Waiting for background tasks");
        }
        drop(reservations);
        drop(queue);

        tokio::select! {
            result = &mut worker => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, stopping worker");
                signal_shutdown(&shutdown);
                if let Err(e) = worker.await {
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
        }

        pool.close().await;
    }
}

/// Flip the worker's shutdown flag. Returns `false` when the worker had
/// already stopped listening.
fn signal_shutdown(shutdown: &watch::Sender<bool>) -> bool {
    match shutdown.send(true) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Worker already stopped before shutdown signal");
            false
        }
    }
}

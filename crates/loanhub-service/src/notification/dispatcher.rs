//! Notifies the next waiting user that a unit has come free.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, UserId, WaitlistEntryId};
use loanhub_database::LoanStore;
use loanhub_entity::device::Device;
use loanhub_entity::user::User;
use loanhub_resilience::{CircuitBreaker, CircuitBreakerError, RetryHandler, with_timeout};

use super::error::DeliveryError;
use super::transport::{MailMessage, MailTransport};
use crate::waitlist::WaitlistService;

/// Result of one `notify_next_user` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Nobody is waiting for the device.
    QueueEmpty,
    /// The user was mailed and the entry marked notified.
    Notified {
        /// The entry that was served.
        entry_id: WaitlistEntryId,
        /// The notified user.
        user_id: UserId,
    },
    /// Delivery failed; the entry stays pending.
    Failed {
        /// The entry that remains at the head of the queue.
        entry_id: WaitlistEntryId,
        /// Final delivery error.
        error: DeliveryError,
    },
}

/// Sends "your device is available" mail to the head of a waitlist.
///
/// Each attempt is bounded by a timeout, retried with backoff on
/// retryable failures, and the whole retry sequence runs inside the
/// circuit breaker. The breaker and retry handler are shared handles
/// built once for the mail gateway.
///
/// Calls for the same device run one at a time, so the head entry is
/// marked notified before the next caller reads the queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    waitlist: Arc<WaitlistService>,
    store: Arc<dyn LoanStore>,
    transport: Arc<dyn MailTransport>,
    breaker: CircuitBreaker,
    retry: RetryHandler,
    attempt_timeout: Duration,
    device_locks: Arc<Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>>,
}

impl NotificationDispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        waitlist: Arc<WaitlistService>,
        store: Arc<dyn LoanStore>,
        transport: Arc<dyn MailTransport>,
        breaker: CircuitBreaker,
        retry: RetryHandler,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            waitlist,
            store,
            transport,
            breaker,
            retry,
            attempt_timeout,
            device_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The breaker guarding the mail gateway.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Notify the earliest pending waiter for `device_id`.
    ///
    /// Delivery failures come back as [`NotifyOutcome::Failed`] and leave
    /// the entry pending for a later trigger. `Err` is reserved for
    /// storage and lookup failures.
    pub async fn notify_next_user(&self, device_id: DeviceId) -> AppResult<NotifyOutcome> {
        let device_lock = self.device_lock(device_id).await;
        let _guard = device_lock.lock().await;

        let Some(entry) = self.waitlist.next_user(device_id).await? else {
            info!(device_id = %device_id, "Waitlist empty, nothing to notify");
            return Ok(NotifyOutcome::QueueEmpty);
        };

        let device = self
            .store
            .find_device(device_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Device {device_id} not found")))?;
        let user = self
            .store
            .find_user(entry.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {} not found", entry.user_id)))?;

        let message = availability_message(&device, &user);

        match self.deliver(&message).await {
            Ok(()) => {
                match self.waitlist.mark_notified(entry.id).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(entry_id = %entry.id, "Entry was no longer pending after delivery");
                    }
                    Err(e) => return Err(e),
                }
                info!(
                    device_id = %device_id,
                    entry_id = %entry.id,
                    user_id = %user.id,
                    "Waitlisted user notified"
                );
                Ok(NotifyOutcome::Notified {
                    entry_id: entry.id,
                    user_id: user.id,
                })
            }
            Err(error) => {
                warn!(
                    device_id = %device_id,
                    entry_id = %entry.id,
                    user_id = %user.id,
                    error = %error,
                    "Waitlist notification failed, entry left pending"
                );
                Ok(NotifyOutcome::Failed {
                    entry_id: entry.id,
                    error,
                })
            }
        }
    }

    async fn device_lock(&self, device_id: DeviceId) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        let lock = locks.entry(device_id).or_default();
        if Arc::strong_count(lock) > 1 {
            debug!(device_id = %device_id, "Waiting for in-flight notification on device");
        }
        Arc::clone(lock)
    }

    async fn deliver(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        let transport = &self.transport;
        let limit = self.attempt_timeout;

        self.breaker
            .execute(|| {
                self.retry.execute_if(
                    || with_timeout(limit, transport.send(message)),
                    DeliveryError::is_retryable,
                )
            })
            .await
            .map_err(|e| match e {
                CircuitBreakerError::Open => DeliveryError::CircuitOpen,
                CircuitBreakerError::Inner(inner) => inner,
            })
    }
}

/// Compose the availability mail for a waiting user.
pub fn availability_message(device: &Device, user: &User) -> MailMessage {
    MailMessage {
        to: user.email.clone(),
        subject: format!("{} is available", device.display_name()),
        body: format!(
            "Hi {},\n\nA {} you are waiting for is available again. \
             Reserve it soon, units are handed out first come, first served.\n",
            user.greeting_name(),
            device.display_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use loanhub_resilience::{CircuitBreakerConfig, CircuitState, RetryPolicy};

    use crate::testing::Fixture;

    /// Fails the first `failures` sends with `error`, then succeeds.
    struct ScriptedTransport {
        failures: u32,
        error: DeliveryError,
        calls: AtomicU32,
        sent: Mutex<Vec<MailMessage>>,
    }

    impl ScriptedTransport {
        fn new(failures: u32, error: DeliveryError) -> Arc<Self> {
            Arc::new(Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MailTransport for ScriptedTransport {
        async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(self.error.clone());
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Takes `delay` per send and records every recipient.
    struct SlowTransport {
        delay: Duration,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailTransport for SlowTransport {
        async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
            tokio::time::sleep(self.delay).await;
            self.sent.lock().unwrap().push(message.to.clone());
            Ok(())
        }
    }

    /// Never answers.
    struct HangingTransport;

    #[async_trait]
    impl MailTransport for HangingTransport {
        async fn send(&self, _message: &MailMessage) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    fn retry() -> RetryHandler {
        RetryHandler::new(
            "mail",
            RetryPolicy::default()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(1)),
        )
    }

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "mail",
            CircuitBreakerConfig {
                failure_threshold,
                ..CircuitBreakerConfig::default()
            },
        )
    }

    fn dispatcher(fx: &Fixture, transport: Arc<dyn MailTransport>, breaker: CircuitBreaker) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(fx.waitlist()),
            Arc::new(fx.store.clone()),
            transport,
            breaker,
            retry(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_is_noop() {
        let fx = Fixture::new(0);
        let transport = ScriptedTransport::new(0, DeliveryError::CircuitOpen);
        let outcome = dispatcher(&fx, transport.clone(), breaker(5))
            .notify_next_user(fx.device_id)
            .await
            .unwrap();

        assert_eq!(outcome, NotifyOutcome::QueueEmpty);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures_marks_notified() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        let joined = fx.waitlist().join(ada, fx.device_id).await.unwrap();
        let transport = ScriptedTransport::new(2, DeliveryError::Transient("503".into()));

        let outcome = dispatcher(&fx, transport.clone(), breaker(5))
            .notify_next_user(fx.device_id)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotifyOutcome::Notified {
                entry_id: joined.entry.id,
                user_id: ada,
            }
        );
        assert_eq!(transport.calls(), 3);
        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].subject.contains("Canon EOS R6"));
        assert!(fx.waitlist().next_user(fx.device_id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_leave_entry_pending() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        let joined = fx.waitlist().join(ada, fx.device_id).await.unwrap();
        let transport = ScriptedTransport::new(u32::MAX, DeliveryError::Transient("503".into()));

        let outcome = dispatcher(&fx, transport.clone(), breaker(5))
            .notify_next_user(fx.device_id)
            .await
            .unwrap();

        assert!(matches!(outcome, NotifyOutcome::Failed { entry_id, .. } if entry_id == joined.entry.id));
        assert_eq!(transport.calls(), 3);
        let next = fx.waitlist().next_user(fx.device_id).await.unwrap().unwrap();
        assert_eq!(next.id, joined.entry.id);
        assert!(!next.is_notified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        fx.waitlist().join(ada, fx.device_id).await.unwrap();
        let transport = ScriptedTransport::new(u32::MAX, DeliveryError::Permanent("400".into()));

        let outcome = dispatcher(&fx, transport.clone(), breaker(5))
            .notify_next_user(fx.device_id)
            .await
            .unwrap();

        assert!(matches!(outcome, NotifyOutcome::Failed { error: DeliveryError::Permanent(_), .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_is_bounded_by_timeout() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        fx.waitlist().join(ada, fx.device_id).await.unwrap();
        let start = tokio::time::Instant::now();

        let outcome = dispatcher(&fx, Arc::new(HangingTransport), breaker(5))
            .notify_next_user(fx.device_id)
            .await
            .unwrap();

        assert!(matches!(outcome, NotifyOutcome::Failed { error: DeliveryError::Timeout(_), .. }));
        // Three 5s attempts plus 100ms and 200ms backoff.
        assert_eq!(start.elapsed(), Duration::from_millis(15_300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast_without_sending() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        fx.waitlist().join(ada, fx.device_id).await.unwrap();
        let transport = ScriptedTransport::new(u32::MAX, DeliveryError::Transient("down".into()));
        let dispatcher = dispatcher(&fx, transport.clone(), breaker(1));

        dispatcher.notify_next_user(fx.device_id).await.unwrap();
        assert_eq!(dispatcher.breaker().state().await, CircuitState::Open);
        let calls_before = transport.calls();

        let outcome = dispatcher.notify_next_user(fx.device_id).await.unwrap();

        assert!(matches!(outcome, NotifyOutcome::Failed { error: DeliveryError::CircuitOpen, .. }));
        assert_eq!(transport.calls(), calls_before);
        assert!(fx.waitlist().next_user(fx.device_id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_serve_consecutive_waiters() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        let bob = fx.add_user("bob");
        fx.waitlist().join(ada, fx.device_id).await.unwrap();
        fx.waitlist().join(bob, fx.device_id).await.unwrap();
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(50),
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = dispatcher(&fx, transport.clone(), breaker(5));

        let (first, second) = tokio::join!(
            dispatcher.notify_next_user(fx.device_id),
            dispatcher.notify_next_user(fx.device_id),
        );

        let mut served = [first.unwrap(), second.unwrap()]
            .into_iter()
            .map(|outcome| match outcome {
                NotifyOutcome::Notified { user_id, .. } => user_id,
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect::<Vec<_>>();
        served.sort_by_key(|id| *id == bob);
        assert_eq!(served, vec![ada, bob]);

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent, vec!["ada@example.com".to_string(), "bob@example.com".to_string()]);
        assert!(fx.waitlist().next_user(fx.device_id).await.unwrap().is_none());
    }
}

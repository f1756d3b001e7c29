use crate::client::MessagingClient;
use crate::config::ConsumerConfig;
use crate::context::consumer_span;
use crate::error::RelayError;
use crate::forwarder::Forwarder;
use crate::interrupt::{Interrupt, shutdown_requested};
use crate::object::Destination;
use crate::processor::ConsumerProcessor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

struct Worker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drains one destination on a fixed-delay schedule and forwards every
/// message it receives.
///
/// Each running task owns a single worker; ticks run one after another and
/// the next tick is scheduled `delay` after the previous one returned.
pub struct ConsumerTask<C, F> {
    destination: Destination,
    config: ConsumerConfig,
    client: Arc<Mutex<C>>,
    forwarder: Arc<F>,
    shutdown_rx: watch::Receiver<bool>,
    consumed: Arc<AtomicU64>,
    worker: Option<Worker>,
    start_time: Option<OffsetDateTime>,
    stop_time: Option<OffsetDateTime>,
}

impl<C, F> ConsumerTask<C, F>
where
    C: MessagingClient + 'static,
    F: Forwarder + 'static,
{
    pub fn new(
        destination: Destination,
        client: C,
        forwarder: Arc<F>,
        config: ConsumerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            destination,
            config,
            client: Arc::new(Mutex::new(client)),
            forwarder,
            shutdown_rx,
            consumed: Arc::new(AtomicU64::new(0)),
            worker: None,
            start_time: None,
            stop_time: None,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub fn start_time(&self) -> Option<OffsetDateTime> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<OffsetDateTime> {
        self.stop_time
    }

    pub fn consumed_message_count(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Setters take effect on the next [`ConsumerTask::start`].
    pub fn set_receive_timeout(&mut self, timeout: Duration) {
        let _entered = consumer_span(&self.destination).entered();
        debug!("Receive timeout set to {:?}", timeout);
        self.config.receive_timeout_millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn set_initial_delay(&mut self, delay: Duration) {
        let _entered = consumer_span(&self.destination).entered();
        debug!("Initial delay set to {:?}", delay);
        self.config.initial_delay_secs = delay.as_secs();
    }

    pub fn set_delay(&mut self, delay: Duration) {
        let _entered = consumer_span(&self.destination).entered();
        debug!("Delay set to {:?}", delay);
        self.config.delay_secs = delay.as_secs();
    }

    /// Schedules the consumer: first tick after `initial_delay`, then every
    /// `delay` after the previous tick completes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if the destination or intervals are
    /// invalid, and [`RelayError::Runtime`] when called outside a Tokio runtime.
    pub fn start(&mut self) -> Result<(), RelayError> {
        let span = consumer_span(&self.destination);
        let _entered = span.enter();

        info!("Starting consumer for {}", self.destination);
        self.verify_configuration()?;
        if self.is_running() {
            warn!("Consumer for {} is already running", self.destination);
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|e| RelayError::Runtime(e.to_string()))?;

        // A stopped worker may still finish a forward; it keeps counting into
        // the previous run's counter.
        self.consumed = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);
        let interrupt = Interrupt::new(stop_rx, self.shutdown_rx.clone());
        let processor = ConsumerProcessor::new(
            self.destination.clone(),
            self.config.receive_timeout(),
            self.client.clone(),
            self.forwarder.clone(),
            self.consumed.clone(),
        );

        let handle = runtime.spawn(
            schedule(
                processor,
                interrupt,
                self.config.initial_delay(),
                self.config.delay(),
            )
            .instrument(span.clone()),
        );

        self.worker = Some(Worker { stop_tx, handle });
        self.start_time = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Interrupts the worker without waiting for the current tick to drain.
    /// Does nothing if the task was never started.
    pub fn stop(&mut self) {
        let span = consumer_span(&self.destination);
        let _entered = span.enter();

        if let Some(worker) = self.worker.take() {
            info!("Shutting down consumer worker");
            // The worker may already have exited on host shutdown.
            let _ = worker.stop_tx.send(true);
            info!("Consumer worker shut down");
            self.stop_time = Some(OffsetDateTime::now_utc());
        }
    }

    /// Stops the task and waits for the in-flight tick to release its connection.
    pub async fn shutdown(mut self) {
        let span = consumer_span(&self.destination);
        async {
            if let Some(worker) = self.worker.take() {
                let _ = worker.stop_tx.send(true);
                if let Err(e) = worker.handle.await {
                    warn!("Consumer worker ended abnormally: {}", e);
                }
                info!("Consumer for {} shut down", self.destination);
            }
        }
        .instrument(span)
        .await
    }

    /// Stops, waits `initial_delay`, then starts again. A host shutdown during
    /// the wait leaves the task stopped.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`ConsumerTask::start`].
    pub async fn restart(&mut self) -> Result<(), RelayError> {
        let span = consumer_span(&self.destination);
        async {
            self.stop();
            tokio::select! {
                biased;
                () = shutdown_requested(self.shutdown_rx.clone()) => {
                    warn!("Restart was interrupted - consumer will not be restarted");
                    Ok(())
                }
                () = tokio::time::sleep(self.config.initial_delay()) => self.start(),
            }
        }
        .instrument(span)
        .await
    }

    fn verify_configuration(&self) -> Result<(), RelayError> {
        if self.destination.name.trim().is_empty() {
            return Err(RelayError::Configuration(
                "destination name must not be empty".to_string(),
            ));
        }
        self.config.validate()
    }
}

impl<C, F> Drop for ConsumerTask<C, F> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(true);
        }
    }
}

async fn schedule<C, F>(
    processor: ConsumerProcessor<C, F>,
    interrupt: Interrupt,
    initial_delay: Duration,
    delay: Duration,
) where
    C: MessagingClient + 'static,
    F: Forwarder + 'static,
{
    let mut next_tick = initial_delay;
    loop {
        tokio::select! {
            biased;
            () = interrupt.interrupted() => break,
            () = tokio::time::sleep(next_tick) => {}
        }
        let forwarded = processor.run(&interrupt).await;
        debug!("Tick forwarded {} messages", forwarded);
        next_tick = delay;
    }
    debug!("Consumer schedule ended");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::client::{MessagingClient, MockMessagingClient};
    use crate::config::ConsumerConfig;
    use crate::consumer::ConsumerTask;
    use crate::error::{ClientError, ForwardError, RelayError};
    use crate::forwarder::{Forwarder, MockForwarder};
    use crate::interrupt::Interrupt;
    use crate::model::Message;
    use crate::object::Destination;
    use async_trait::async_trait;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::{Semaphore, mpsc, watch};

    fn idle_config() -> ConsumerConfig {
        ConsumerConfig {
            receive_timeout_millis: 10,
            initial_delay_secs: 3600,
            delay_secs: 3600,
        }
    }

    fn idle_task(
        config: ConsumerConfig,
    ) -> (ConsumerTask<MockMessagingClient, MockForwarder>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = ConsumerTask::new(
            Destination::queue("audit"),
            MockMessagingClient::new(),
            Arc::new(MockForwarder::new()),
            config,
            shutdown_rx,
        );
        (task, shutdown_tx)
    }

    /// In-memory broker that honours the interrupt while waiting for messages.
    #[derive(Clone, Default)]
    struct FakeBroker {
        calls: Arc<StdMutex<Vec<&'static str>>>,
        pending: Arc<StdMutex<VecDeque<Message>>>,
        started: Arc<StdMutex<bool>>,
    }

    impl FakeBroker {
        fn with_messages(messages: Vec<Message>) -> Self {
            let broker = Self::default();
            broker.pending.lock().unwrap().extend(messages);
            broker
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
        }
    }

    #[async_trait]
    impl MessagingClient for FakeBroker {
        async fn connect(&mut self) -> Result<(), ClientError> {
            self.record("connect");
            Ok(())
        }

        async fn create_consumer(&mut self, _destination: &Destination) -> Result<(), ClientError> {
            self.record("create_consumer");
            Ok(())
        }

        async fn start_connection(&mut self) -> Result<(), ClientError> {
            self.record("start_connection");
            *self.started.lock().unwrap() = true;
            Ok(())
        }

        fn is_connection_started(&self) -> bool {
            *self.started.lock().unwrap()
        }

        async fn stop_connection(&mut self) {
            self.record("stop_connection");
            *self.started.lock().unwrap() = false;
        }

        async fn cleanup(&mut self) -> Result<(), ClientError> {
            self.record("cleanup");
            *self.started.lock().unwrap() = false;
            Ok(())
        }

        async fn receive(
            &mut self,
            timeout: Duration,
            interrupt: &Interrupt,
        ) -> Result<Option<Message>, ClientError> {
            self.record("receive");
            let next = self.pending.lock().unwrap().pop_front();
            if next.is_some() {
                return Ok(next);
            }
            tokio::select! {
                () = interrupt.interrupted() => Err(ClientError::Interrupted),
                () = tokio::time::sleep(timeout) => Ok(None),
            }
        }
    }

    /// Forwarder that blocks every call until a permit is released.
    struct GatedForwarder {
        entered: AtomicBool,
        gate: Semaphore,
    }

    impl GatedForwarder {
        fn closed() -> Self {
            Self {
                entered: AtomicBool::new(false),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Forwarder for GatedForwarder {
        async fn forward(&self, _message: Message) -> Result<(), ForwardError> {
            self.entered.store(true, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            Ok(())
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_then_stop_toggles_running() {
        let (mut task, _shutdown_tx) = idle_task(idle_config());
        assert!(!task.is_running());

        task.start().unwrap();
        assert!(task.is_running());
        assert!(task.start_time().is_some());

        task.stop();
        assert!(!task.is_running());
        assert!(task.stop_time().is_some());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let (mut task, _shutdown_tx) = idle_task(idle_config());
        task.stop();

        assert!(!task.is_running());
        assert!(task.stop_time().is_none());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (mut task, _shutdown_tx) = idle_task(idle_config());

        assert!(matches!(task.start(), Err(RelayError::Runtime(_))));
        assert!(!task.is_running());
    }

    #[rstest]
    #[case(ConsumerConfig { delay_secs: 0, ..idle_config() })]
    #[case(ConsumerConfig { receive_timeout_millis: 0, ..idle_config() })]
    #[tokio::test]
    async fn test_invalid_configuration_fails_start(#[case] config: ConsumerConfig) {
        let (mut task, _shutdown_tx) = idle_task(config);

        assert!(matches!(task.start(), Err(RelayError::Configuration(_))));
        assert!(!task.is_running());
        assert!(task.start_time().is_none());
    }

    #[tokio::test]
    async fn test_empty_destination_fails_start() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            Destination::topic("  "),
            MockMessagingClient::new(),
            Arc::new(MockForwarder::new()),
            idle_config(),
            shutdown_rx,
        );

        assert!(matches!(task.start(), Err(RelayError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_task_running() {
        let (mut task, _shutdown_tx) = idle_task(idle_config());
        task.start().unwrap();

        task.restart().await.unwrap();

        assert!(task.is_running());
        task.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_interrupted_by_shutdown_stays_stopped() {
        let (mut task, shutdown_tx) = idle_task(idle_config());
        task.start().unwrap();
        shutdown_tx.send(true).unwrap();

        task.restart().await.unwrap();

        assert!(!task.is_running());
        assert!(task.stop_time().is_some());
    }

    #[tokio::test]
    async fn test_scheduled_tick_forwards_and_counts() {
        let destination = Destination::queue("audit");
        let broker = FakeBroker::with_messages(vec![
            Message::new(destination.clone(), "one"),
            Message::new(destination.clone(), "two"),
        ]);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let mut forwarder = MockForwarder::new();
        forwarder.expect_forward().times(2).returning(move |message| {
            let _ = seen_tx.send(message.body);
            Ok(())
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            destination,
            broker.clone(),
            Arc::new(forwarder),
            ConsumerConfig {
                receive_timeout_millis: 20,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();

        assert_eq!(seen_rx.recv().await.unwrap(), b"one");
        assert_eq!(seen_rx.recv().await.unwrap(), b"two");
        eventually(|| task.consumed_message_count() == 2).await;

        task.stop();
        eventually(|| broker.count("stop_connection") == 1).await;
        assert_eq!(broker.count("connect"), 1);
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocking_receive() {
        let broker = FakeBroker::default();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            Destination::topic("alerts"),
            broker.clone(),
            Arc::new(MockForwarder::new()),
            ConsumerConfig {
                receive_timeout_millis: 60_000,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();
        eventually(|| broker.count("receive") == 1).await;

        task.stop();

        eventually(|| broker.count("stop_connection") == 1).await;
        assert_eq!(broker.count("cleanup"), 1);
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_host_shutdown_ends_worker() {
        let broker = FakeBroker::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            Destination::queue("audit"),
            broker.clone(),
            Arc::new(MockForwarder::new()),
            ConsumerConfig {
                receive_timeout_millis: 60_000,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();
        eventually(|| broker.count("receive") == 1).await;

        shutdown_tx.send(true).unwrap();

        eventually(|| !task.is_running()).await;
        assert_eq!(broker.count("stop_connection"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_teardown() {
        let broker = FakeBroker::default();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            Destination::queue("audit"),
            broker.clone(),
            Arc::new(MockForwarder::new()),
            ConsumerConfig {
                receive_timeout_millis: 60_000,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();
        eventually(|| broker.count("receive") == 1).await;

        task.shutdown().await;

        assert_eq!(broker.count("cleanup"), 1);
        assert_eq!(broker.count("stop_connection"), 1);
    }

    #[tokio::test]
    async fn test_start_resets_consumed_count() {
        let destination = Destination::queue("audit");
        let broker = FakeBroker::with_messages(vec![Message::new(destination.clone(), "one")]);
        let mut forwarder = MockForwarder::new();
        forwarder.expect_forward().returning(|_| Ok(()));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            destination,
            broker.clone(),
            Arc::new(forwarder),
            ConsumerConfig {
                receive_timeout_millis: 20,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();
        eventually(|| task.consumed_message_count() == 1).await;
        task.stop();
        eventually(|| broker.count("stop_connection") == 1).await;

        task.set_initial_delay(Duration::from_secs(3600));
        task.start().unwrap();

        assert_eq!(task.consumed_message_count(), 0);
        task.stop();
    }

    #[tokio::test]
    async fn test_in_flight_forward_is_not_counted_by_next_run() {
        let destination = Destination::queue("audit");
        let broker = FakeBroker::with_messages(vec![Message::new(destination.clone(), "slow")]);
        let forwarder = Arc::new(GatedForwarder::closed());

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = ConsumerTask::new(
            destination,
            broker.clone(),
            forwarder.clone(),
            ConsumerConfig {
                receive_timeout_millis: 20,
                initial_delay_secs: 0,
                delay_secs: 3600,
            },
            shutdown_rx,
        );
        task.start().unwrap();
        eventually(|| forwarder.entered.load(Ordering::SeqCst)).await;

        task.stop();
        task.set_initial_delay(Duration::from_secs(3600));
        task.start().unwrap();
        forwarder.gate.add_permits(1);

        eventually(|| broker.count("stop_connection") == 1).await;
        assert_eq!(task.consumed_message_count(), 0);
        task.stop();
    }

    #[test]
    fn test_setters_apply_to_next_start() {
        let (mut task, _shutdown_tx) = idle_task(idle_config());

        task.set_receive_timeout(Duration::from_millis(250));
        task.set_initial_delay(Duration::from_secs(7));
        task.set_delay(Duration::from_secs(30));

        assert_eq!(task.config().receive_timeout(), Duration::from_millis(250));
        assert_eq!(task.config().initial_delay(), Duration::from_secs(7));
        assert_eq!(task.config().delay(), Duration::from_secs(30));
        assert!(!task.is_running());
    }
}

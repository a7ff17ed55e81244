//! Cached, periodically refreshed view of one lamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt, Shared};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use strum_macros::Display;

use crate::command::Command;
use crate::config::{DeviceConfig, DeviceInfo};
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::request::{DeviceAddress, Request};
use crate::runtime::{self, BoxFuture, Instant, JoinHandle};
use crate::state::DeviceState;
use crate::transport::{TcpTransport, Transport};

type Result<T> = std::result::Result<T, Error>;

type RefreshOutcome = std::result::Result<Arc<DeviceState>, Arc<Error>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type Listener = dyn Fn(std::result::Result<&DeviceState, &Error>) + Send + Sync + 'static;

/// Handle returned by [`Coordinator::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Where a coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    /// No refresh has run yet.
    Uninitialized,
    /// A state query is in flight.
    Refreshing,
    /// The cache holds the result of the latest refresh.
    Ready,
    /// The latest refresh failed; the cache holds an older snapshot.
    Stale,
    /// Every refresh so far has failed.
    Failed,
    /// [`Coordinator::stop`] has been called.
    Stopped,
}

struct InFlight {
    generation: u64,
    future: SharedRefresh,
}

struct Poller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner<T> {
    address: DeviceAddress,
    poll_interval: Duration,
    transport: T,
    cache: RwLock<Option<Arc<DeviceState>>>,
    last_error: RwLock<Option<Arc<Error>>>,
    last_success: Mutex<Option<Instant>>,
    in_flight: Mutex<Option<InFlight>>,
    next_generation: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, Arc<Listener>>>,
    next_listener: AtomicU64,
    history: Mutex<MessageHistory>,
    poller: Mutex<Option<Poller>>,
    stopped: AtomicBool,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    transport_calls: AtomicU64,
}

/// Owns the cached state of one lamp and keeps it fresh.
///
/// Reads ([`state`](Self::state), [`last_error`](Self::last_error)) never
/// block on the network. Refreshes are deduplicated: however many callers
/// ask at once, at most one state query is on the wire, and all of them get
/// its result.
///
/// Handles are cheap to clone and share the same cache. The polling task
/// started by [`start`](Self::start) only holds a weak reference, so
/// dropping every handle ends it.
///
/// ```ignore
/// use dlight_rs::{Coordinator, DeviceConfig, PowerMode, Command};
///
/// let coordinator = Coordinator::connect(&DeviceConfig::new("192.168.1.40", "a1b2c3")).await?;
/// coordinator.send_command(vec![Command::from(&PowerMode::On)]).await?;
/// assert!(coordinator.state().unwrap().is_on());
/// ```
pub struct Coordinator<T: Transport = TcpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Coordinator {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Coordinator<TcpTransport> {
    /// Build a coordinator speaking TCP to the configured lamp.
    ///
    /// Nothing is sent until the first refresh.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_transport(
            config.address(),
            config.poll_interval,
            TcpTransport::new(config.transport.clone()),
        ))
    }

    /// Build, run the first refresh, and start polling.
    ///
    /// Fails with [`Error::Unavailable`] if the lamp cannot be read, so the
    /// caller can retry setup later.
    pub async fn connect(config: &DeviceConfig) -> Result<Self> {
        let coordinator = Self::new(config)?;
        coordinator.first_refresh().await?;
        coordinator.start()?;
        Ok(coordinator)
    }
}

impl<T: Transport> Coordinator<T> {
    pub fn with_transport(address: DeviceAddress, poll_interval: Duration, transport: T) -> Self {
        Coordinator {
            inner: Arc::new(Inner {
                address,
                poll_interval,
                transport,
                cache: RwLock::new(None),
                last_error: RwLock::new(None),
                last_success: Mutex::new(None),
                in_flight: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
                history: Mutex::new(MessageHistory::new()),
                poller: Mutex::new(None),
                stopped: AtomicBool::new(false),
                refreshes: AtomicU64::new(0),
                failed_refreshes: AtomicU64::new(0),
                transport_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.inner.address
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// The last good snapshot, or `None` if there has never been one.
    pub fn state(&self) -> Option<Arc<DeviceState>> {
        read(&self.inner.cache).clone()
    }

    /// Why the latest refresh failed, cleared by the next success.
    pub fn last_error(&self) -> Option<Arc<Error>> {
        read(&self.inner.last_error).clone()
    }

    /// The last good snapshot, or [`Error::Unavailable`].
    pub fn require_state(&self) -> Result<Arc<DeviceState>> {
        self.state()
            .ok_or_else(|| Error::Unavailable(self.last_error()))
    }

    /// Whether a snapshot exists to serve.
    pub fn is_available(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst) && read(&self.inner.cache).is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Phase::Stopped;
        }
        if lock(&self.inner.in_flight).is_some() {
            return Phase::Refreshing;
        }
        match (self.state().is_some(), self.last_error().is_some()) {
            (false, false) => Phase::Uninitialized,
            (false, true) => Phase::Failed,
            (true, false) => Phase::Ready,
            (true, true) => Phase::Stale,
        }
    }

    /// Query the lamp's state and replace the cache with it.
    ///
    /// Joins a refresh that is already in flight instead of starting another.
    /// On failure the cache is left as it was and the cause is returned
    /// wrapped in [`Error::UpdateFailed`].
    pub async fn refresh(&self) -> Result<Arc<DeviceState>> {
        self.refresh_since(0).await
    }

    /// The initial refresh during setup; failure means the lamp is unavailable.
    pub async fn first_refresh(&self) -> Result<Arc<DeviceState>> {
        self.refresh().await.map_err(|e| match e {
            Error::UpdateFailed(cause) => Error::Unavailable(Some(cause)),
            other => other,
        })
    }

    /// Execute `commands` on the lamp, then resynchronise the cache.
    ///
    /// The follow-up refresh always starts after the lamp acknowledged the
    /// commands, so the cache reflects what the lamp actually did. If that
    /// refresh fails the error is recorded but the command still succeeds.
    /// A failed execute is returned as-is and nothing is refreshed.
    pub async fn send_command(&self, commands: Vec<Command>) -> Result<Value> {
        self.ensure_running()?;
        if commands.is_empty() || commands.iter().any(|c| !c.is_valid()) {
            return Err(Error::EmptyCommand);
        }

        let request = Request::execute(&self.inner.address, commands);
        let response = self.inner.call(&request).await.inspect_err(|e| {
            error!(
                "Error sending command to dLight {}: {e}",
                self.inner.address.device_id()
            )
        })?;

        let since = self.inner.next_generation.load(Ordering::SeqCst);
        if let Err(e) = self.refresh_since(since).await {
            debug!("Refresh after command failed: {e}");
        }
        Ok(response)
    }

    /// Ask the lamp to describe itself.
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        self.ensure_running()?;
        let response = self
            .inner
            .call(&Request::query_info(&self.inner.address))
            .await?;
        DeviceInfo::try_from(response)
    }

    /// Start polling every [`poll_interval`](Self::poll_interval).
    ///
    /// Ticks are fixed-rate from the moment of the call; manual refreshes do
    /// not move them. Calling `start` on a running coordinator does nothing.
    pub fn start(&self) -> Result<()> {
        self.ensure_running()?;
        let mut poller = lock(&self.inner.poller);
        if poller.is_some() {
            return Ok(());
        }

        let (stop, stop_rx) = oneshot::channel();
        let handle = runtime::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            self.inner.poll_interval,
            stop_rx,
        ));
        *poller = Some(Poller { stop, handle });
        debug!(
            "Polling dLight {} every {:?}",
            self.inner.address.device_id(),
            self.inner.poll_interval
        );
        Ok(())
    }

    /// Stop polling and tear down. Every later operation fails with
    /// [`Error::Stopped`].
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(poller) = lock(&self.inner.poller).take() {
            let _ = poller.stop.send(());
            poller.handle.abort();
        }
        lock(&self.inner.in_flight).take();
        info!("Stopped dLight {}", self.inner.address.device_id());
    }

    /// Call `listener` after every refresh, successful or not.
    ///
    /// Listeners run on whichever task completed the refresh and must not block.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(std::result::Result<&DeviceState, &Error>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.inner.listeners).insert(id, Arc::new(listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        lock(&self.inner.listeners).remove(&id).is_some()
    }

    pub fn history(&self) -> MessageHistory {
        lock(&self.inner.history).clone()
    }

    /// Returns diagnostics including state, counters, and history.
    pub fn diagnostics(&self) -> Value {
        let inner = &self.inner;
        json!({
            "address": inner.address.to_string(),
            "device_id": inner.address.device_id(),
            "phase": self.phase().to_string(),
            "poll_interval_secs": inner.poll_interval.as_secs_f64(),
            "polling": lock(&inner.poller).is_some(),
            "state": self.state().map(|s| s.to_value()),
            "last_error": self.last_error().map(|e| e.to_string()),
            "seconds_since_update": (*lock(&inner.last_success)).map(|t| t.elapsed().as_secs_f64()),
            "refreshes": inner.refreshes.load(Ordering::Relaxed),
            "failed_refreshes": inner.failed_refreshes.load(Ordering::Relaxed),
            "transport_calls": inner.transport_calls.load(Ordering::Relaxed),
            "history": serde_json::to_value(lock(&inner.history).summary()).unwrap_or(Value::Null),
        })
    }

    /// Refresh, accepting only a result from a query numbered `min_generation`
    /// or later. An older in-flight query is awaited and then followed by a
    /// new one, so there is still never more than one on the wire.
    async fn refresh_since(&self, min_generation: u64) -> Result<Arc<DeviceState>> {
        loop {
            self.ensure_running()?;
            let (generation, refresh) = self.join_or_start();
            let outcome = refresh.await;
            if generation >= min_generation {
                return outcome.map_err(Error::UpdateFailed);
            }
        }
    }

    fn join_or_start(&self) -> (u64, SharedRefresh) {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(in_flight) = slot.as_ref() {
            return (in_flight.generation, in_flight.future.clone());
        }

        // The query runs as its own task so it completes even if every
        // caller waiting on it is dropped.
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let task = runtime::spawn(async move { inner.run_refresh(generation).await });
        let refresh: BoxFuture<'static, RefreshOutcome> = Box::pin(task);
        let refresh = refresh.shared();
        *slot = Some(InFlight {
            generation,
            future: refresh.clone(),
        });
        (generation, refresh)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            Err(Error::Stopped)
        } else {
            Ok(())
        }
    }
}

impl<T: Transport> Inner<T> {
    async fn call(&self, request: &Request) -> Result<Value> {
        let command_type = request.command_type();
        if let Ok(sent) = serde_json::to_value(request) {
            lock(&self.history).record(MessageType::Send, command_type, &sent);
        }
        self.transport_calls.fetch_add(1, Ordering::Relaxed);

        let outcome = self.transport.execute(&self.address, request).await;

        let mut history = lock(&self.history);
        match &outcome {
            Ok(response) => history.record(MessageType::Receive, command_type, response),
            Err(e) => history.record_error(&e.to_string()),
        }
        outcome
    }

    async fn run_refresh(&self, generation: u64) -> RefreshOutcome {
        let fetched = self
            .call(&Request::query_states(&self.address))
            .await
            .and_then(DeviceState::from_response);

        let outcome = if self.stopped.load(Ordering::SeqCst) {
            Err(Arc::new(Error::Stopped))
        } else {
            match fetched {
                Ok(state) => Ok(self.publish(state)),
                Err(e) => Err(self.record_failure(e)),
            }
        };

        {
            let mut slot = lock(&self.in_flight);
            if slot.as_ref().is_some_and(|f| f.generation == generation) {
                *slot = None;
            }
        }

        self.notify(&outcome);
        outcome
    }

    fn publish(&self, state: DeviceState) -> Arc<DeviceState> {
        let state = Arc::new(state);
        *write(&self.cache) = Some(Arc::clone(&state));
        let recovered = write(&self.last_error).take().is_some();
        *lock(&self.last_success) = Some(Instant::now());
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        if recovered {
            info!("Fetching dLight {} data recovered", self.address.device_id());
        }
        debug!("dLight {} state: {}", self.address.device_id(), state.to_value());
        state
    }

    fn record_failure(&self, err: Error) -> Arc<Error> {
        let err = Arc::new(err);
        let already_failing = write(&self.last_error)
            .replace(Arc::clone(&err))
            .is_some();
        self.failed_refreshes.fetch_add(1, Ordering::Relaxed);

        let has_cache = read(&self.cache).is_some();
        match (already_failing, has_cache) {
            (true, _) => debug!("dLight {} still failing: {err}", self.address.device_id()),
            (false, true) => warn!(
                "Error communicating with dLight {}, keeping last state: {err}",
                self.address.device_id()
            ),
            (false, false) => error!(
                "Error communicating with dLight {}, device unavailable: {err}",
                self.address.device_id()
            ),
        }
        err
    }

    fn notify(&self, outcome: &RefreshOutcome) {
        let listeners: Vec<Arc<Listener>> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            match outcome {
                Ok(state) => listener(Ok(state.as_ref())),
                Err(err) => listener(Err(err.as_ref())),
            }
        }
    }
}

async fn poll_loop<T: Transport>(
    inner: Weak<Inner<T>>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let started = Instant::now();
    let mut tick: u32 = 0;

    loop {
        let elapsed = started.elapsed();
        let due = (elapsed.as_nanos() / interval.as_nanos().max(1)) as u32;
        tick = tick.max(due) + 1;
        let wait = (interval * tick).saturating_sub(elapsed);

        let sleep = Box::pin(runtime::sleep(wait));
        if let Either::Left(_) = future::select(&mut stop, sleep).await {
            break;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let coordinator = Coordinator { inner };
        if let Err(e) = coordinator.refresh().await {
            debug!("Scheduled refresh failed: {e}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Check that a lamp answers before creating a coordinator for it.
pub async fn probe(config: &DeviceConfig) -> Result<DeviceInfo> {
    config.validate()?;
    let address = config.address();
    let transport = TcpTransport::new(config.transport.clone());
    let response = transport
        .execute(&address, &Request::query_info(&address))
        .await
        .inspect_err(|e| error!("Failed to connect to dLight at {address}: {e}"))?;
    DeviceInfo::try_from(response)
}
